//! YAML configuration: loading, rule compilation and destination lookup.
//!
//! The top-level entry points are [`load_config`] and [`Config::find_server`].

use crate::server::{DEFAULT_PORT, IdlePolicy, RuleDefinition, ServerRecord};
use anyhow::{Context as _, Result, anyhow};
use regex::bytes::Regex;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file used when neither `--config` nor `SSHX_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "~/.ssh/sshx.yaml";

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    servers: Vec<RawServer>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    #[serde(default)]
    alias: Vec<String>,
    #[serde(default)]
    host: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    idle_max_seconds: u64,
    #[serde(default)]
    idle_send_string: Option<String>,
    #[serde(default)]
    expect: Vec<RawExpect>,
}

#[derive(Debug, Deserialize)]
struct RawExpect {
    #[serde(default, rename = "match")]
    pattern: String,
    #[serde(default)]
    send: String,
    #[serde(default)]
    send_max_times: u32,
    #[serde(default)]
    end: bool,
}

/// The validated configuration: every rule pattern is already compiled.
#[derive(Debug, Default)]
pub struct Config {
    pub servers: Vec<ServerRecord>,
}

/// Load the config file at `path`.
///
/// An empty path or a file that does not exist yields an empty [`Config`]; the tool is
/// usable with plain `user@host` destinations without any config.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid YAML, or holds
/// an expect rule with an empty or invalid pattern.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Ok(Config::default());
    }
    match std::fs::metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to stat config file: {}", path.display()));
        }
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_str(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse a configuration from an in-memory YAML document.
pub fn parse_str(content: &str) -> Result<Config> {
    // An empty document deserializes to `None` rather than an empty struct.
    let raw: Option<RawConfig> = serde_yaml::from_str(content).context("Failed to parse YAML")?;
    let servers = raw
        .unwrap_or_default()
        .servers
        .into_iter()
        .map(compile_server)
        .collect::<Result<Vec<_>>>()?;
    Ok(Config { servers })
}

fn compile_server(raw: RawServer) -> Result<ServerRecord> {
    let mut rules = Vec::with_capacity(raw.expect.len());
    for ex in raw.expect {
        if ex.pattern.is_empty() {
            return Err(anyhow!(
                "server: {}@{}, `expect.match` must not be empty",
                raw.user,
                raw.host
            ));
        }
        let pattern = Regex::new(&ex.pattern).map_err(|e| {
            anyhow!(
                "server: {}@{}, compile regexp `{}` of `expect.match` failed: {}",
                raw.user,
                raw.host,
                ex.pattern,
                e
            )
        })?;
        rules.push(
            RuleDefinition::new(pattern, ex.send)
                .with_max_triggers(ex.send_max_times)
                .ending(ex.end),
        );
    }

    Ok(ServerRecord {
        aliases: raw.alias,
        host: raw.host,
        port: if raw.port == 0 { DEFAULT_PORT } else { raw.port },
        user: raw.user,
        password: raw.password.filter(|p| !p.is_empty()),
        idle: IdlePolicy {
            max_seconds: raw.idle_max_seconds,
            filler: raw.idle_send_string.filter(|s| !s.is_empty()),
        },
        rules,
    })
}

impl Config {
    /// Resolve a destination to a server record.
    ///
    /// `user@host` matches a configured server with the same user and host,
    /// or falls back to an ephemeral record. Anything else is treated as an
    /// alias.
    pub fn find_server(&self, dest: &str) -> Result<ServerRecord> {
        let parts: Vec<&str> = dest.split('@').collect();
        if let [user, host] = parts.as_slice() {
            let found = self
                .servers
                .iter()
                .find(|s| s.host == *host && s.user == *user);
            return Ok(found
                .cloned()
                .unwrap_or_else(|| ServerRecord::ephemeral(*user, *host)));
        }

        if let Some(server) = self
            .servers
            .iter()
            .find(|s| s.aliases.iter().any(|a| a == dest))
        {
            return Ok(server.clone());
        }

        let known: Vec<&str> = self
            .servers
            .iter()
            .flat_map(|s| s.aliases.iter().map(String::as_str))
            .collect();
        Err(anyhow!(
            "not found alias `{}`, available: [{}]",
            dest,
            known.join(" ")
        ))
    }

    /// One line per configured server: `alias1 alias2 --> user@host [port]`.
    pub fn alias_lines(&self) -> Vec<String> {
        self.servers
            .iter()
            .map(|s| {
                let line = format!("{} --> {}", s.aliases.join(" "), s.destination());
                if s.port != DEFAULT_PORT {
                    format!("{line} [{}]", s.port)
                } else {
                    line
                }
            })
            .collect()
    }
}

/// Expand a leading `~` or `~/` to the current user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return PathBuf::from(path);
    };
    if path == "~" {
        home
    } else if let Some(rest) = path.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Parse a duration string: `500ms`, `30s`, `1.5m`, `1h`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Some(ms_str) = s.strip_suffix("ms") {
        let ms: u64 = ms_str
            .trim()
            .parse()
            .context("Invalid milliseconds value")?;
        return Ok(Duration::from_millis(ms));
    }
    let (value, unit) = if let Some(v) = s.strip_suffix('s') {
        (v, 1.0)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60.0)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3600.0)
    } else {
        return Err(anyhow!(
            "Duration must end with 'ms', 's', 'm' or 'h', got: {}",
            s
        ));
    };
    let value: f64 = value.trim().parse().context("Invalid duration value")?;
    Duration::try_from_secs_f64(value * unit).map_err(|e| anyhow!("Invalid duration {s}: {e}"))
}
