//! SSH transport implementation using russh.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{debug, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{Algorithm, PublicKey};
use russh::{Channel, ChannelMsg, Preferred, cipher, kex};

use super::config::{HostKeyVerification, SshConfig, TransportAuth};
use crate::channel::TerminalChannel;
use crate::credential::{CredentialRole, CredentialSet};
use crate::error::{CredentialError, Result, TransportError};
use crate::target::CryptoParams;

/// SSH transport wrapping russh client.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    ///
    /// With [`TransportAuth::Password`] the login credential from
    /// `credentials` is presented as the SSH password.
    pub async fn connect(config: SshConfig, credentials: &CredentialSet) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            preferred: preferred(&config.crypto)?,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification,
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("Connecting to {}", config.socket_addr());
        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // A host key rejection carries a more useful error than russh's
            let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            match (stored, e) {
                (Some(hk_err), _) => hk_err,
                (None, russh::Error::IO(source)) => TransportError::ConnectionFailed {
                    host: config.host.clone(),
                    port: config.port,
                    source,
                },
                (None, e) => TransportError::Ssh(e),
            }
        })?;

        Self::authenticate(&mut session, &config, credentials).await?;

        Ok(Self { session, config })
    }

    /// Open a PTY shell channel on this connection.
    pub async fn open_channel(&self) -> Result<SshChannel> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "vt100",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(SshChannel {
            channel,
            login_completed: self.config.auth == TransportAuth::Password,
        })
    }

    /// Authenticate with the server.
    async fn authenticate(
        session: &mut Handle<SshHandler>,
        config: &SshConfig,
        credentials: &CredentialSet,
    ) -> Result<()> {
        let success = match config.auth {
            TransportAuth::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            TransportAuth::Password => {
                let credential = credentials
                    .get(CredentialRole::Login)
                    .ok_or(CredentialError::NotConfigured(CredentialRole::Login))?;
                let password = std::str::from_utf8(credential.expose())
                    .map_err(|_| TransportError::PasswordNotUtf8)?;
                session
                    .authenticate_password(&config.username, password)
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// Negotiation preferences with the requested algorithms tried first.
fn preferred(crypto: &CryptoParams) -> std::result::Result<Preferred, TransportError> {
    let mut preferred = Preferred::default();

    if let Some(name) = &crypto.kex_algorithm {
        let kex = kex::Name::try_from(name.as_str())
            .map_err(|_| unsupported("key-exchange", name))?;
        preferred.kex = prepend(kex, &preferred.kex);
    }
    if let Some(name) = &crypto.cipher {
        let cipher = cipher::Name::try_from(name.as_str())
            .map_err(|_| unsupported("cipher", name))?;
        preferred.cipher = prepend(cipher, &preferred.cipher);
    }
    if let Some(name) = &crypto.host_key_algorithm {
        let key = name
            .parse::<Algorithm>()
            .map_err(|_| unsupported("host-key", name))?;
        preferred.key = prepend(key, &preferred.key);
    }

    Ok(preferred)
}

fn prepend<T: Clone + PartialEq>(first: T, rest: &[T]) -> Cow<'static, [T]> {
    let mut list = vec![first.clone()];
    list.extend(rest.iter().filter(|name| **name != first).cloned());
    Cow::Owned(list)
}

fn unsupported(kind: &'static str, name: &str) -> TransportError {
    TransportError::UnsupportedAlgorithm {
        kind,
        name: name.to_string(),
    }
}

/// A PTY shell channel on an SSH connection.
pub struct SshChannel {
    channel: Channel<Msg>,
    login_completed: bool,
}

impl TerminalChannel for SshChannel {
    async fn read_chunk(&mut self) -> std::result::Result<Option<Bytes>, TransportError> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    return Ok(Some(Bytes::copy_from_slice(&data[..])));
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return Ok(Some(Bytes::copy_from_slice(&data[..])));
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(other) => trace!("ssh: ignoring {:?}", other),
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        self.channel.data(data).await?;
        Ok(())
    }

    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        if let Err(e) = self.channel.eof().await {
            trace!("ssh: eof failed: {}", e);
        }
        self.channel.close().await?;
        Ok(())
    }

    fn login_completed(&self) -> bool {
        self.login_completed
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key for {}: {}", self.host, e);
                    }
                    Ok(true)
                }
                Err(e) => Ok(self.reject(e)),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => Ok(self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                })),
                Err(e) => Ok(self.reject(e)),
            },
        }
    }
}
