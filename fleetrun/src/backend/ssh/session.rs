//! Interactive CLI session over an SSH PTY.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use regex::bytes::Regex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;

use super::buffer::PatternBuffer;
use super::config::SshOptions;
use super::profile::PlatformProfile;
use super::transport::SshTransport;
use crate::backend::CommandOutput;
use crate::error::BackendError;
use crate::inventory::Host;

/// One logged-in shell on a device, positioned at a prompt.
pub(crate) struct CliSession<'p> {
    transport: SshTransport,
    channel: Channel<Msg>,
    buffer: PatternBuffer,
    profile: &'p PlatformProfile,
    timeout: Duration,
    hostname: String,
}

impl<'p> CliSession<'p> {
    /// Connect, wait for the first prompt, escalate if needed and run the
    /// profile's on-open commands.
    pub async fn open(
        host: &Host,
        profile: &'p PlatformProfile,
        options: &SshOptions,
    ) -> Result<Self, BackendError> {
        let transport = SshTransport::connect(host, options).await?;
        let channel = transport.open_shell(options).await?;

        let mut session = Self {
            transport,
            channel,
            buffer: PatternBuffer::new(options.search_depth),
            profile,
            timeout: options.timeout,
            hostname: host.hostname.clone(),
        };

        let banner = session.read_until(&[&profile.prompt]).await?.1;
        session.escalate(host, &banner).await?;

        for command in &profile.on_open_commands {
            session.exchange(command).await?;
        }

        debug!("Session open on {} ({})", session.hostname, profile.name);
        Ok(session)
    }

    /// Send a command and return its normalized output.
    ///
    /// Output containing one of the profile's failure patterns is reported
    /// as [`BackendError::CommandRejected`].
    pub async fn send_command(&mut self, command: &str) -> Result<CommandOutput, BackendError> {
        let start = Instant::now();
        let raw = self.exchange(command).await?;
        let output = normalize(&raw, command, &self.profile.ignored_line_prefixes);
        trace!(
            "{}: '{}' answered in {:?}",
            self.hostname,
            command,
            start.elapsed()
        );

        if let Some(pattern) = self.profile.detect_failure(&output) {
            return Err(BackendError::CommandRejected {
                command: command.to_string(),
                message: pattern.to_string(),
                output,
            });
        }

        Ok(CommandOutput::new(command, output))
    }

    /// Close the channel and the connection. Failures are only logged.
    pub async fn close(self) {
        if let Err(e) = self.channel.close().await {
            trace!("Channel close on {}: {}", self.hostname, e);
        }
        if let Err(e) = self.transport.close().await {
            warn!("Disconnect from {} failed: {}", self.hostname, e);
        }
    }

    /// Send `enable` (or equivalent) when the login prompt is unprivileged.
    async fn escalate(&mut self, host: &Host, banner: &str) -> Result<(), BackendError> {
        let profile = self.profile;
        let Some(escalation) = &profile.escalation else {
            return Ok(());
        };
        let prompt_line = banner.lines().last().unwrap_or_default();
        if !escalation.unprivileged.is_match(prompt_line.as_bytes()) {
            return Ok(());
        }

        debug!("Escalating privilege on {}", self.hostname);
        self.write_line(&escalation.command).await?;
        let (matched, _) = self
            .read_until(&[&escalation.password_prompt, &profile.prompt])
            .await?;

        if matched == 0 {
            let password = host
                .credentials
                .as_ref()
                .and_then(|c| c.password.as_ref())
                .ok_or_else(|| BackendError::MissingCredentials {
                    host: host.hostname.clone(),
                })?;
            self.write_line(password.expose_secret()).await?;
            let (_, after) = self.read_until(&[&profile.prompt]).await?;
            let prompt_line = after.lines().last().unwrap_or_default();
            if escalation.unprivileged.is_match(prompt_line.as_bytes()) {
                return Err(BackendError::AuthenticationFailed {
                    user: host
                        .credentials
                        .as_ref()
                        .map(|c| c.username.clone())
                        .unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    /// Send a line and read up to the next prompt.
    async fn exchange(&mut self, command: &str) -> Result<String, BackendError> {
        let profile = self.profile;
        self.write_line(command).await?;
        let (_, raw) = self.read_until(&[&profile.prompt]).await?;
        Ok(raw)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), BackendError> {
        let data = format!("{line}\n");
        self.channel.data(data.as_bytes()).await?;
        Ok(())
    }

    /// Read until the tail matches one of `patterns`.
    ///
    /// Returns the index of the matching pattern and everything read, with
    /// the buffer reset.
    async fn read_until(&mut self, patterns: &[&Regex]) -> Result<(usize, String), BackendError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if let Some(index) = patterns.iter().position(|p| self.buffer.tail_contains(p)) {
                let data = self.buffer.take();
                return Ok((index, String::from_utf8_lossy(&data).into_owned()));
            }

            match tokio::time::timeout_at(deadline, self.channel.wait()).await {
                Err(_) => {
                    trace!(
                        "{}: no prompt after {} bytes",
                        self.hostname,
                        self.buffer.len()
                    );
                    return Err(BackendError::Timeout(self.timeout));
                }
                Ok(Some(ChannelMsg::Data { data })) => self.buffer.extend(&data),
                Ok(Some(ChannelMsg::ExtendedData { data, .. })) => self.buffer.extend(&data),
                Ok(Some(ChannelMsg::Eof | ChannelMsg::Close)) | Ok(None) => {
                    return Err(BackendError::Disconnected);
                }
                Ok(Some(_)) => {}
            }
        }
    }
}

/// Strip the command echo and trailing prompt, drop ignored lines.
fn normalize(raw: &str, command: &str, ignored_prefixes: &[String]) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "");
    let text = text
        .strip_prefix(command)
        .unwrap_or(&text)
        .trim_start_matches('\n');

    // The last line is the prompt
    let body = match memchr::memrchr(b'\n', text.as_bytes()) {
        Some(pos) => &text[..pos],
        None => "",
    };

    body.lines()
        .filter(|line| {
            !ignored_prefixes
                .iter()
                .any(|prefix| line.trim_start().starts_with(prefix.as_str()))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_echo_and_prompt() {
        let raw = "show version\r\nCisco IOS XE Software\r\nuptime is 1 day\r\nrouter#";
        assert_eq!(
            normalize(raw, "show version", &[]),
            "Cisco IOS XE Software\nuptime is 1 day"
        );
    }

    #[test]
    fn test_normalize_empty_output() {
        assert_eq!(normalize("terminal length 0\r\nrouter#", "terminal length 0", &[]), "");
        assert_eq!(normalize("router#", "end", &[]), "");
    }

    #[test]
    fn test_normalize_drops_ignored_lines() {
        let raw = "set system ntp server 1.1.1.1\r\n\r\n[edit]\r\nuser@router# ";
        let ignored = vec!["[edit".to_string()];
        assert_eq!(
            normalize(raw, "set system ntp server 1.1.1.1", &ignored),
            ""
        );

        let raw = "show | compare\r\n[edit system]\r\n+   ntp server 1.1.1.1;\r\n\r\n[edit]\r\nuser@router# ";
        assert_eq!(
            normalize(raw, "show | compare", &ignored),
            "+   ntp server 1.1.1.1;\n"
        );
    }
}
