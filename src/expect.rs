//! Automatic responses to the child's output.
//!
//! [`ExpectEngine`] decides, chunk by chunk, whether to answer a password
//! prompt or fire an expect rule. [`ExpectWriter`] sits in front of the local
//! terminal, forwards every chunk unchanged and writes the engine's answers
//! to the child's stdin.

use crate::prompt::is_password_prompt;
use crate::pty::PtyInput;
use crate::server::{RuleDefinition, ServerRecord};
use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// After this long the password heuristic is switched off for good.
pub const PASSWORD_GRACE: Duration = Duration::from_secs(60);

/// Per-session mutable automation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutomationState {
    /// Set at most once, never cleared.
    pub password_sent: bool,
    /// Latched when a rule with `end` fires; disables all automation.
    pub ended: bool,
    /// How often each rule has fired, indexed like the rule list.
    pub trigger_counts: Vec<u32>,
}

/// What the engine wants written to the child.
#[derive(Clone, PartialEq, Eq)]
pub enum Response {
    Password(Vec<u8>),
    Rule { index: usize, payload: Vec<u8> },
}

impl Response {
    pub fn payload(&self) -> &[u8] {
        match self {
            Response::Password(payload) => payload,
            Response::Rule { payload, .. } => payload,
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Password(_) => f.write_str("Password(<redacted>)"),
            Response::Rule { index, payload } => f
                .debug_struct("Rule")
                .field("index", index)
                .field("payload", &String::from_utf8_lossy(payload))
                .finish(),
        }
    }
}

pub struct ExpectEngine {
    password: Option<String>,
    rules: Vec<RuleDefinition>,
    state: AutomationState,
    started_at: Instant,
}

impl ExpectEngine {
    /// Create an engine for `server`; the password grace window starts at
    /// `started_at`.
    pub fn new(server: &ServerRecord, started_at: Instant) -> Self {
        Self {
            password: server.password.clone().filter(|p| !p.is_empty()),
            rules: server.rules.clone(),
            state: AutomationState {
                trigger_counts: vec![0; server.rules.len()],
                ..AutomationState::default()
            },
            started_at,
        }
    }

    pub fn state(&self) -> &AutomationState {
        &self.state
    }

    /// Inspect one output chunk using the current time.
    pub fn process(&mut self, chunk: &[u8]) -> Option<Response> {
        self.process_at(chunk, Instant::now())
    }

    /// Inspect one output chunk as if observed at `now`.
    ///
    /// At most one response is produced per chunk: the password answer takes
    /// precedence, otherwise the first eligible rule whose pattern matches.
    pub fn process_at(&mut self, chunk: &[u8], now: Instant) -> Option<Response> {
        if self.state.ended || chunk.is_empty() {
            return None;
        }

        if !self.state.password_sent
            && now.saturating_duration_since(self.started_at) > PASSWORD_GRACE
        {
            debug!("password grace window elapsed, prompt detection disabled");
            self.state.password_sent = true;
        }

        if !self.state.password_sent && is_password_prompt(chunk) {
            if let Some(password) = &self.password {
                self.state.password_sent = true;
                let mut payload = password.clone().into_bytes();
                payload.push(b'\n');
                return Some(Response::Password(payload));
            }
        }

        let index = self
            .rules
            .iter()
            .zip(&self.state.trigger_counts)
            .position(|(rule, count)| *count < rule.max_triggers && rule.pattern.is_match(chunk))?;

        let rule = &self.rules[index];
        self.state.trigger_counts[index] += 1;
        if rule.end {
            self.state.ended = true;
        }
        let mut payload = rule.send.clone().into_bytes();
        payload.push(b'\n');
        Some(Response::Rule { index, payload })
    }
}

/// Forwards child output to `inner` and answers it through `input`.
pub struct ExpectWriter<W> {
    inner: W,
    engine: ExpectEngine,
    input: PtyInput,
}

impl<W: Write> ExpectWriter<W> {
    pub fn new(inner: W, engine: ExpectEngine, input: PtyInput) -> Self {
        Self {
            inner,
            engine,
            input,
        }
    }

    pub fn engine(&self) -> &ExpectEngine {
        &self.engine
    }

    fn respond(&mut self, chunk: &[u8]) {
        let Some(response) = self.engine.process(chunk) else {
            return;
        };
        match &response {
            Response::Password(_) => info!("password prompt detected, sending password"),
            Response::Rule { index, .. } => info!(
                rule = index,
                pattern = %self.engine.rules[*index].pattern,
                "expect rule matched"
            ),
        }
        // A missed answer must not end the session.
        if let Err(e) = self.input.write(response.payload()) {
            warn!(error = %e, response = ?response, "failed to send automated response");
        }
    }
}

impl<W: Write> Write for ExpectWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.inner.write_all(buf)?;
        self.inner.flush()?;
        self.respond(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SharedBuf;
    use regex::bytes::Regex;

    fn rule(pattern: &str, send: &str) -> RuleDefinition {
        RuleDefinition::new(Regex::new(pattern).unwrap(), send)
    }

    fn server(password: Option<&str>, rules: Vec<RuleDefinition>) -> ServerRecord {
        let mut server = ServerRecord::ephemeral("bob", "10.0.0.1");
        server.password = password.map(str::to_string);
        server.rules = rules;
        server
    }

    fn payload(response: Option<Response>) -> Option<String> {
        response.map(|r| String::from_utf8_lossy(r.payload()).into_owned())
    }

    const PROMPT: &[u8] = b"bob@10.0.0.1's password: ";

    #[test]
    fn test_max_trigger_count() {
        let sv = server(
            None,
            vec![rule("(?i)continue\\?", "yes").with_max_triggers(2)],
        );
        let mut engine = ExpectEngine::new(&sv, Instant::now());
        let chunk = b"Do you want to continue? [y/n] ";
        assert_eq!(payload(engine.process(chunk)), Some("yes\n".into()));
        assert_eq!(payload(engine.process(chunk)), Some("yes\n".into()));
        assert_eq!(engine.process(chunk), None);
        assert_eq!(engine.state().trigger_counts, vec![2]);
    }

    #[test]
    fn test_exhausted_rule_falls_through_to_next() {
        let sv = server(None, vec![rule("ready", "first"), rule("ready", "second")]);
        let mut engine = ExpectEngine::new(&sv, Instant::now());
        assert_eq!(payload(engine.process(b"ready")), Some("first\n".into()));
        assert_eq!(payload(engine.process(b"ready")), Some("second\n".into()));
        assert_eq!(engine.process(b"ready"), None);
    }

    #[test]
    fn test_only_first_matching_rule_fires() {
        let sv = server(None, vec![rule("a", "one"), rule("b", "two")]);
        let mut engine = ExpectEngine::new(&sv, Instant::now());
        assert_eq!(
            engine.process(b"ab"),
            Some(Response::Rule {
                index: 0,
                payload: b"one\n".to_vec()
            })
        );
        assert_eq!(engine.state().trigger_counts, vec![1, 0]);
    }

    #[test]
    fn test_end_rule_disables_everything() {
        let sv = server(
            Some("secret"),
            vec![
                rule("\\$ $", "uptime").ending(true),
                rule("more", "again").with_max_triggers(5),
            ],
        );
        let mut engine = ExpectEngine::new(&sv, Instant::now());
        assert_eq!(payload(engine.process(b"user@host:~$ ")), Some("uptime\n".into()));
        assert!(engine.state().ended);
        assert_eq!(engine.process(b"more"), None);
        assert_eq!(engine.process(b"user@host:~$ "), None);
        assert_eq!(engine.process(PROMPT), None);
        assert!(!engine.state().password_sent);
    }

    #[test]
    fn test_password_sent_once() {
        let sv = server(Some("secret"), vec![]);
        let mut engine = ExpectEngine::new(&sv, Instant::now());
        assert_eq!(
            engine.process(PROMPT),
            Some(Response::Password(b"secret\n".to_vec()))
        );
        assert!(engine.state().password_sent);
        assert_eq!(engine.process(PROMPT), None);
    }

    #[test]
    fn test_password_takes_precedence_over_rules() {
        let sv = server(Some("secret"), vec![rule("password", "nope")]);
        let mut engine = ExpectEngine::new(&sv, Instant::now());
        assert!(matches!(engine.process(PROMPT), Some(Response::Password(_))));
        // The prompt repeats after a failed login: now only the rule applies.
        assert_eq!(payload(engine.process(PROMPT)), Some("nope\n".into()));
    }

    #[test]
    fn test_no_password_configured() {
        let sv = server(None, vec![]);
        let mut engine = ExpectEngine::new(&sv, Instant::now());
        assert_eq!(engine.process(PROMPT), None);
        assert!(!engine.state().password_sent);
    }

    #[test]
    fn test_password_not_sent_after_grace_window() {
        let sv = server(Some("secret"), vec![rule("password", "rule")]);
        let start = Instant::now();
        let mut engine = ExpectEngine::new(&sv, start);
        let late = start + PASSWORD_GRACE + Duration::from_secs(1);
        // The grace flag flips, then rules are still evaluated for the chunk.
        assert_eq!(payload(engine.process_at(PROMPT, late)), Some("rule\n".into()));
        assert!(engine.state().password_sent);
        assert_eq!(engine.process_at(b"Password:", late), None);
    }

    #[test]
    fn test_password_within_grace_window() {
        let sv = server(Some("secret"), vec![]);
        let start = Instant::now();
        let mut engine = ExpectEngine::new(&sv, start);
        let at = start + PASSWORD_GRACE;
        assert!(matches!(
            engine.process_at(PROMPT, at),
            Some(Response::Password(_))
        ));
    }

    #[test]
    fn test_large_chunk_still_matches_rules() {
        let sv = server(Some("secret"), vec![rule("banner", "ack")]);
        let mut engine = ExpectEngine::new(&sv, Instant::now());
        let mut chunk = b"banner ".repeat(300);
        chunk.extend_from_slice(b" password:");
        assert!(chunk.len() > 1024);
        assert_eq!(payload(engine.process(&chunk)), Some("ack\n".into()));
        assert!(!engine.state().password_sent);
    }

    #[test]
    fn test_response_debug_redacts_password() {
        let debug = format!("{:?}", Response::Password(b"secret\n".to_vec()));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_writer_forwards_and_answers() {
        let terminal = SharedBuf::default();
        let child = SharedBuf::default();
        let sv = server(Some("secret"), vec![rule("(?i)continue\\?", "yes")]);
        let mut writer = ExpectWriter::new(
            terminal.clone(),
            ExpectEngine::new(&sv, Instant::now()),
            PtyInput::new(child.clone()),
        );

        writer.write_all(PROMPT).unwrap();
        writer.write_all(b"Continue? ").unwrap();
        writer.write_all(b"Continue? ").unwrap();

        let mut expected = PROMPT.to_vec();
        expected.extend_from_slice(b"Continue? Continue? ");
        assert_eq!(terminal.contents(), expected);
        assert_eq!(child.contents(), b"secret\nyes\n");
        assert!(writer.engine().state().password_sent);
    }

    #[test]
    fn test_writer_survives_failed_answer() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let terminal = SharedBuf::default();
        let sv = server(None, vec![rule("x", "y")]);
        let mut writer = ExpectWriter::new(
            terminal.clone(),
            ExpectEngine::new(&sv, Instant::now()),
            PtyInput::new(Broken),
        );
        assert_eq!(writer.write(b"x").unwrap(), 1);
        assert_eq!(terminal.contents(), b"x");
    }
}
