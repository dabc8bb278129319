//! Interactive CLI backend over SSH.
//!
//! [`SshCliBackend`] drives a device shell the way an operator would: log
//! in, wait for the prompt, send one line, read to the next prompt. A
//! [`profile::PlatformProfile`] supplies everything platform specific.
//!
//! Each call opens its own session and closes it before returning, so one
//! backend instance can serve any number of hosts concurrently.

mod buffer;
pub mod config;
pub mod profile;
mod session;
mod transport;

pub use config::{HostKeyVerification, SshOptions};
pub use profile::PlatformProfile;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::{Map, Value};

use self::session::CliSession;
use super::{CommandOutput, ConfigBackend, ConfigOutcome, FactBackend};
use crate::error::BackendError;
use crate::inventory::Host;

/// Fact and config backend for one platform profile.
///
/// Facts are not parsed: each getter maps to the raw text of the commands
/// the profile lists for it, as `{getter: {command: output}}` with echo and
/// prompt removed. Callers wanting vendor, version and the like extract them
/// from that text, or register a fact backend that parses.
#[derive(Debug, Clone)]
pub struct SshCliBackend {
    profile: PlatformProfile,
    options: SshOptions,
}

impl SshCliBackend {
    pub fn new(profile: PlatformProfile, options: SshOptions) -> Self {
        Self { profile, options }
    }

    /// Backend for a built-in platform profile.
    pub fn builtin(platform: &str, options: SshOptions) -> Option<Self> {
        profile::builtin(platform).map(|profile| Self::new(profile, options))
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    async fn open(&self, host: &Host) -> Result<CliSession<'_>, BackendError> {
        CliSession::open(host, &self.profile, &self.options).await
    }

    /// Run the config flow on an open session.
    ///
    /// Returns `Err` only for transport problems; a rejected command comes
    /// back as a rejected outcome.
    async fn apply(
        &self,
        session: &mut CliSession<'_>,
        commands: &[String],
    ) -> Result<ConfigOutcome, BackendError> {
        let mut transcript = Transcript::default();

        for command in &self.profile.enter_config {
            transcript.push(session.send_command(command).await?);
        }

        let mut rejected = None;
        for (applied, command) in commands.iter().enumerate() {
            match session.send_command(command).await {
                Ok(output) => transcript.push(output),
                Err(BackendError::CommandRejected {
                    command, output, ..
                }) => {
                    transcript.push(CommandOutput::new(command.clone(), output));
                    rejected = Some(rejection(&self.profile, &command, applied, commands.len()));
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let outcome = match rejected {
            Some((failure, changed)) => {
                if let Some(abort) = &self.profile.abort_command {
                    transcript.push(session.send_command(abort).await?);
                }
                ConfigOutcome::rejected(failure, String::new()).with_changed(changed)
            }
            None => {
                let changed = match &self.profile.compare_command {
                    Some(compare) => {
                        let diff = session.send_command(compare).await?;
                        let changed = !diff.output.trim().is_empty();
                        transcript.push(diff);
                        changed
                    }
                    None => !commands.is_empty(),
                };
                if changed {
                    if let Some(commit) = &self.profile.commit_command {
                        match session.send_command(commit).await {
                            Ok(output) => transcript.push(output),
                            Err(BackendError::CommandRejected { output, .. }) => {
                                transcript.push(CommandOutput::new(commit.clone(), output));
                                if let Some(abort) = &self.profile.abort_command {
                                    transcript.push(session.send_command(abort).await?);
                                }
                                self.leave_config(session, &mut transcript).await;
                                return Ok(ConfigOutcome::rejected(
                                    "commit failed",
                                    transcript.into_string(),
                                ));
                            }
                            Err(e) => return Err(e),
                        }
                    }
                }
                ConfigOutcome::applied(changed, String::new())
            }
        };

        self.leave_config(session, &mut transcript).await;
        Ok(ConfigOutcome {
            raw_output: transcript.into_string(),
            ..outcome
        })
    }

    async fn leave_config(&self, session: &mut CliSession<'_>, transcript: &mut Transcript) {
        for command in &self.profile.exit_config {
            match session.send_command(command).await {
                Ok(output) => transcript.push(output),
                Err(e) => {
                    warn!("Leaving config mode failed: {}", e);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl FactBackend for SshCliBackend {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn supported_getters(&self) -> Vec<&str> {
        self.profile.getters.keys().map(String::as_str).collect()
    }

    async fn get_facts(&self, host: &Host, getters: &[String]) -> Result<Value, BackendError> {
        self.validate_getters(getters)?;

        let mut session = self.open(host).await?;
        let result = async {
            let mut facts = Map::new();
            for getter in getters {
                let mut outputs = Map::new();
                for command in &self.profile.getters[getter.as_str()] {
                    let response = session.send_command(command).await?;
                    outputs.insert(response.command, Value::String(response.output));
                }
                facts.insert(getter.clone(), Value::Object(outputs));
            }
            Ok::<_, BackendError>(Value::Object(facts))
        }
        .await;
        session.close().await;

        debug!("{}: {} getter(s) collected", host.hostname, getters.len());
        result
    }
}

#[async_trait]
impl ConfigBackend for SshCliBackend {
    fn name(&self) -> &str {
        &self.profile.name
    }

    async fn send_config(
        &self,
        host: &Host,
        commands: &[String],
    ) -> Result<ConfigOutcome, BackendError> {
        let mut session = self.open(host).await?;
        let outcome = self.apply(&mut session, commands).await;
        session.close().await;

        if let Ok(outcome) = &outcome {
            match &outcome.failure {
                Some(failure) => warn!("{}: configuration rejected: {}", host.hostname, failure),
                None => info!(
                    "{}: {} configuration line(s) applied, changed={}",
                    host.hostname,
                    commands.len(),
                    outcome.changed
                ),
            }
        }
        outcome
    }

    async fn send_commands(
        &self,
        host: &Host,
        commands: &[String],
    ) -> Result<Vec<CommandOutput>, BackendError> {
        let mut session = self.open(host).await?;
        let mut outputs = Vec::with_capacity(commands.len());
        let mut result = Ok(());
        for command in commands {
            match session.send_command(command).await {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        session.close().await;
        result.map(|_| outputs)
    }
}

/// Failure message for a rejected line, and whether the device kept the
/// lines sent before it.
///
/// Transactional profiles roll everything back; session-based ones have
/// already applied the first `applied` lines.
fn rejection(
    profile: &PlatformProfile,
    command: &str,
    applied: usize,
    total: usize,
) -> (String, bool) {
    if profile.is_transactional() {
        (
            format!("command '{command}' rejected, {applied} of {total} rolled back"),
            false,
        )
    } else {
        (
            format!("command '{command}' rejected after {applied} of {total} applied"),
            applied > 0,
        )
    }
}

/// Device output of a config exchange, in order.
#[derive(Default)]
struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    fn push(&mut self, output: CommandOutput) {
        self.lines.push(output.command);
        if !output.output.is_empty() {
            self.lines.push(output.output);
        }
    }

    fn into_string(self) -> String {
        self.lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_backend() {
        let backend = SshCliBackend::builtin("juniper_junos", SshOptions::default()).unwrap();
        assert_eq!(FactBackend::name(&backend), "juniper_junos");
        assert!(backend.supports("facts"));
        assert!(!backend.supports("bgp_neighbors"));
        assert!(SshCliBackend::builtin("netware", SshOptions::default()).is_none());
    }

    #[tokio::test]
    async fn test_unsupported_getter_fails_before_connecting() {
        let backend = SshCliBackend::builtin("linux", SshOptions::default()).unwrap();
        // No credentials: reaching the transport would fail differently
        let host = Host::new("h1").with_platform("linux");

        let err = backend
            .get_facts(&host, &["bgp_neighbors".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedGetter { .. }));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let backend = SshCliBackend::builtin("cisco_ios", SshOptions::default()).unwrap();
        let host = Host::new("r1").with_platform("cisco_ios");

        let err = backend
            .send_config(&host, &["ntp server 1.1.1.1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MissingCredentials { .. }));
    }

    #[test]
    fn test_rejection_on_session_profile_keeps_earlier_lines() {
        let ios = profile::cisco_ios();
        let (message, changed) = rejection(&ios, "ntp srver 1.1.1.1", 2, 3);
        assert_eq!(message, "command 'ntp srver 1.1.1.1' rejected after 2 of 3 applied");
        assert!(changed);

        let (_, changed) = rejection(&ios, "ntp srver 1.1.1.1", 0, 3);
        assert!(!changed);
    }

    #[test]
    fn test_rejection_on_transactional_profile_rolls_back() {
        let junos = profile::juniper_junos();
        let (message, changed) = rejection(&junos, "set system ntp srver 1.1.1.1", 2, 3);
        assert_eq!(
            message,
            "command 'set system ntp srver 1.1.1.1' rejected, 2 of 3 rolled back"
        );
        assert!(!changed);
    }

    #[test]
    fn test_transcript() {
        let mut transcript = Transcript::default();
        transcript.push(CommandOutput::new("configure terminal", ""));
        transcript.push(CommandOutput::new("ntp srver 1.1.1.1", "% Invalid input detected"));
        assert_eq!(
            transcript.into_string(),
            "configure terminal\nntp srver 1.1.1.1\n% Invalid input detected"
        );
    }
}
