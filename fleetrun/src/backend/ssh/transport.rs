//! SSH connection setup using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use russh::Channel;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use secrecy::ExposeSecret;

use super::config::{HostKeyVerification, SshOptions};
use crate::error::BackendError;
use crate::inventory::{Credentials, Host};

/// An authenticated SSH connection to one device.
pub(crate) struct SshTransport {
    session: Handle<SshHandler>,
}

impl SshTransport {
    /// Connect to the host and authenticate with its credentials.
    pub async fn connect(host: &Host, options: &SshOptions) -> Result<Self, BackendError> {
        let credentials = host
            .credentials
            .as_ref()
            .ok_or_else(|| BackendError::MissingCredentials {
                host: host.hostname.clone(),
            })?;

        let address = host.connect_address().to_string();
        let port = host.port.unwrap_or(options.default_port);

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(options.timeout),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<BackendError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: address.clone(),
            port,
            host_key_verification: options.host_key_verification.clone(),
            known_hosts_path: options.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("Connecting to {}:{} for {}", address, port, host.hostname);

        let mut session = tokio::time::timeout(
            options.timeout,
            client::connect(config, (address.as_str(), port), handler),
        )
        .await
        .map_err(|_| BackendError::Timeout(options.timeout))?
        .map_err(|e| {
            // Prefer the detailed host key error over russh's generic one
            let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            match (stored, e) {
                (Some(hk_err), _) => hk_err,
                (None, russh::Error::IO(source)) => BackendError::ConnectionFailed {
                    host: address.clone(),
                    port,
                    source,
                },
                (None, e) => BackendError::Ssh(e),
            }
        })?;

        Self::authenticate(&mut session, credentials).await?;

        Ok(Self { session })
    }

    /// Authenticate with the server.
    async fn authenticate(
        session: &mut Handle<SshHandler>,
        credentials: &Credentials,
    ) -> Result<(), BackendError> {
        let user = credentials.username.as_str();

        let success = if let Some(path) = &credentials.private_key {
            let passphrase = credentials.passphrase.as_ref().map(|p| p.expose_secret());
            let key =
                load_secret_key(path, passphrase).map_err(|e| BackendError::Key(e.to_string()))?;

            let hash_alg = session.best_supported_rsa_hash().await?.flatten();

            session
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                .await?
                .success()
        } else if let Some(password) = &credentials.password {
            session
                .authenticate_password(user, password.expose_secret())
                .await?
                .success()
        } else {
            session.authenticate_none(user).await?.success()
        };

        if !success {
            return Err(BackendError::AuthenticationFailed {
                user: user.to_string(),
            });
        }

        Ok(())
    }

    /// Open a PTY channel with an interactive shell.
    pub async fn open_shell(&self, options: &SshOptions) -> Result<Channel<Msg>, BackendError> {
        let channel = self.session.channel_open_session().await?;

        channel
            .request_pty(
                true,
                "xterm",
                options.terminal_width,
                options.terminal_height,
                0,
                0,
                &[],
            )
            .await?;

        channel.request_shell(true).await?;

        Ok(channel)
    }

    /// Close the connection.
    pub async fn close(self) -> Result<(), BackendError> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host key error surfaced by `connect()`.
    host_key_error: Arc<Mutex<Option<BackendError>>>,
}

impl SshHandler {
    /// `Ok(true)` if the key is known, `Ok(false)` if the host is absent.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> Result<bool, BackendError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(BackendError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(BackendError::KnownHosts(e.to_string())),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) -> Result<(), BackendError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| BackendError::KnownHosts(e.to_string()))
    }

    fn reject(&self, err: BackendError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(err);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let accepted = match self.host_key_verification {
            HostKeyVerification::Disabled => true,

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key for {}: {}", self.host, e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(BackendError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        };
        Ok(accepted)
    }
}
