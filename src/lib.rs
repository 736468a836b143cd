//! # sshx
//!
//! An `ssh` wrapper that automates the boring parts of an interactive login.
//!
//! sshx spawns `ssh` inside a PTY and relays bytes between it and the local
//! terminal, adding three behaviours on top:
//!
//! - **Password entry**: the first chunk of output that looks like a
//!   password prompt (within a minute of starting) is answered with the
//!   configured password.
//! - **Expect rules**: ordered `match`/`send` pairs; the first rule whose
//!   regex matches an output chunk sends its response, up to
//!   `send_max_times` times. A rule marked `end` switches off all further
//!   automation.
//! - **Keepalive**: when neither side has produced traffic for
//!   `idle_max_seconds` (at least 5), a filler string is sent to the remote
//!   shell.
//!
//! Terminal resizes are relayed to the PTY throughout the session.
//!
//! ## Configuration
//!
//! ```yaml
//! servers:
//!   - alias: [web]
//!     host: 10.0.0.1
//!     user: root
//!     password: secret
//!     idle_max_seconds: 60
//!     expect:
//!       - match: "(?i)continue\\?"
//!         send: "yes"
//!         send_max_times: 2
//! ```
//!
//! ## Library use
//!
//! ```no_run
//! use sshx::{Session, config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config("/etc/sshx.yaml")?;
//!     let server = config.find_server("web")?;
//!     Session::new(server).run().await
//! }
//! ```
//!
//! The automation pieces can also be driven directly:
//!
//! ```
//! use sshx::expect::{ExpectEngine, Response};
//! use sshx::server::{RuleDefinition, ServerRecord};
//! use regex::bytes::Regex;
//! use std::time::Instant;
//!
//! let mut server = ServerRecord::ephemeral("root", "10.1.1.5");
//! server.rules.push(RuleDefinition::new(Regex::new("(?i)continue\\?").unwrap(), "yes"));
//!
//! let mut engine = ExpectEngine::new(&server, Instant::now());
//! let response = engine.process(b"Do you want to continue? [y/n] ").unwrap();
//! assert_eq!(response.payload(), b"yes\n");
//! assert!(engine.process(b"Do you want to continue? [y/n] ").is_none());
//! ```

pub mod config;
pub mod expect;
pub mod keepalive;
pub mod logging;
pub mod prompt;
pub mod pty;
pub mod pty_reader;
pub mod resize;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Config, load_config};
pub use expect::{ExpectEngine, ExpectWriter};
pub use prompt::is_password_prompt;
pub use server::{Overrides, ServerRecord};
pub use session::Session;
