//! Immutable description of one login target.
//!
//! A [`ServerRecord`] carries only static data. Everything that changes while
//! a session runs (password-sent flag, rule trigger counts) lives in
//! [`crate::expect::ExpectEngine`], so a record can be resolved and reused
//! without leaking state between sessions.

use regex::bytes::Regex;
use std::fmt;
use std::time::Duration;

/// Port used when the configuration leaves it unset.
pub const DEFAULT_PORT: u16 = 22;

/// One expect rule: when `pattern` matches an output chunk, send `send`.
#[derive(Debug, Clone)]
pub struct RuleDefinition {
    pub pattern: Regex,
    pub send: String,
    pub max_triggers: u32,
    pub end: bool,
}

impl RuleDefinition {
    /// Create a rule that fires once and does not end automation.
    pub fn new(pattern: Regex, send: impl Into<String>) -> Self {
        Self {
            pattern,
            send: send.into(),
            max_triggers: 1,
            end: false,
        }
    }

    pub fn with_max_triggers(mut self, max_triggers: u32) -> Self {
        self.max_triggers = max_triggers.max(1);
        self
    }

    pub fn ending(mut self, end: bool) -> Self {
        self.end = end;
        self
    }
}

/// Keepalive settings. `max_seconds == 0` disables the idle monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdlePolicy {
    pub max_seconds: u64,
    pub filler: Option<String>,
}

impl IdlePolicy {
    pub fn is_enabled(&self) -> bool {
        self.max_seconds > 0
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.max_seconds)
    }
}

#[derive(Clone)]
pub struct ServerRecord {
    pub aliases: Vec<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub idle: IdlePolicy,
    pub rules: Vec<RuleDefinition>,
}

impl ServerRecord {
    /// A record built straight from a `user@host` destination: no password,
    /// no rules, keepalive disabled.
    pub fn ephemeral(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            aliases: Vec::new(),
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: None,
            idle: IdlePolicy::default(),
            rules: Vec::new(),
        }
    }

    /// `user@host`, as passed to the login command.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Apply command-line values on top of the configured ones.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(idle) = overrides.idle_time.filter(|d| !d.is_zero()) {
            self.idle.max_seconds = idle.as_secs_f64().ceil() as u64;
        }
        if let Some(filler) = overrides.idle_string.as_ref().filter(|s| !s.is_empty()) {
            self.idle.filler = Some(filler.clone());
        }
        if let Some(port) = overrides.port.filter(|p| *p > 0) {
            self.port = port;
        }
    }
}

impl fmt::Debug for ServerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRecord")
            .field("aliases", &self.aliases)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("idle", &self.idle)
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Values taken from the command line that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub idle_time: Option<Duration>,
    pub idle_string: Option<String>,
}
