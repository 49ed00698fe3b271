//! Device identity and per-session invocation parameters.

use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::credential::{CredentialRole, FileCredentialSource};
use crate::error::{ConfigError, Result};
use crate::filter::{FilterConfig, OutputFilter};
use crate::protocol::VendorProtocol;

/// Cryptographic preferences handed through to the transport collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CryptoParams {
    /// Key-exchange algorithm name (e.g. `diffie-hellman-group14-sha1`).
    pub kex_algorithm: Option<String>,

    /// Cipher name (e.g. `aes128-ctr`).
    pub cipher: Option<String>,

    /// Host-key algorithm name (e.g. `ssh-rsa`).
    pub host_key_algorithm: Option<String>,
}

/// The device a session talks to. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    host: String,
    user: String,
    short_name: String,
    crypto: CryptoParams,
}

impl DeviceTarget {
    /// Create a target; the short name is derived from the host.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        let host = host.into();
        let short_name = short_hostname(&host).to_string();
        Self {
            host,
            user: user.into(),
            short_name,
            crypto: CryptoParams::default(),
        }
    }

    /// Override the derived short name (useful when `host` is an address).
    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    /// Set the transport cryptographic preferences.
    pub fn with_crypto(mut self, crypto: CryptoParams) -> Self {
        self.crypto = crypto;
        self
    }

    /// Host as given (dotted form).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Login user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Hostname portion before the first `.`.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Transport cryptographic preferences.
    pub fn crypto(&self) -> &CryptoParams {
        &self.crypto
    }
}

/// Segment of `host` before the first `.`.
pub fn short_hostname(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}

/// Typed invocation parameters for one device session.
///
/// Deserialized from a JSON inventory entry or assembled from CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Invocation {
    /// Device host in dotted form.
    pub host: String,

    /// Device family, used to look up the vendor protocol.
    #[serde(alias = "model")]
    pub family: String,

    /// Login user.
    pub user: String,

    /// Path to the login credential file.
    pub password_file: PathBuf,

    /// Path to the secondary privileged credential file.
    #[serde(default)]
    pub privileged_password_file: Option<PathBuf>,

    /// Key-exchange algorithm name.
    #[serde(default, alias = "kexalgorithm")]
    pub kex_algorithm: Option<String>,

    /// Cipher name.
    #[serde(default)]
    pub cipher: Option<String>,

    /// Host-key algorithm name.
    #[serde(default, alias = "hostkeyalgorithm")]
    pub host_key_algorithm: Option<String>,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Override for the derived short hostname.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Per-step timeout override in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Filtering applied to the capture before it is stored.
    #[serde(default)]
    pub filter_config: Option<FilterConfig>,

    /// Positional parameters of older inventories. The first one names the
    /// privileged credential file when `privileged_password_file` is unset;
    /// the rest are ignored.
    #[serde(default)]
    pub extra_expect_params: Vec<String>,
}

fn default_port() -> u16 {
    22
}

impl Invocation {
    /// Check the parameters against the protocol they will run.
    ///
    /// A protocol that needs a privileged credential without a configured
    /// file fails here, before any connection is attempted.
    pub fn validate(&self, protocol: &VendorProtocol) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("host must not be empty"));
        }
        if self.user.trim().is_empty() {
            return Err(invalid("user must not be empty"));
        }
        if self.timeout_secs == Some(0) {
            return Err(invalid("timeout_secs must be greater than zero"));
        }
        for role in protocol.required_credentials() {
            let configured = match role {
                CredentialRole::Login => true,
                CredentialRole::Privileged => self.privileged_file().is_some(),
            };
            if !configured {
                return Err(ConfigError::MissingCredential {
                    family: protocol.name.clone(),
                    role,
                }
                .into());
            }
        }
        if self.extra_expect_params.len() > 1 {
            debug!(
                "{}: ignoring {} extra parameters",
                self.host,
                self.extra_expect_params.len() - 1
            );
        }
        self.filter()?;
        Ok(())
    }

    /// The compiled output filter, if one is configured.
    pub fn filter(&self) -> Result<Option<OutputFilter>> {
        Ok(self
            .filter_config
            .as_ref()
            .map(FilterConfig::compile)
            .transpose()?)
    }

    /// The device target these parameters describe.
    pub fn target(&self) -> DeviceTarget {
        let target = DeviceTarget::new(&self.host, &self.user).with_crypto(CryptoParams {
            kex_algorithm: self.kex_algorithm.clone(),
            cipher: self.cipher.clone(),
            host_key_algorithm: self.host_key_algorithm.clone(),
        });
        match &self.hostname {
            Some(name) => target.with_short_name(name),
            None => target,
        }
    }

    /// The file-backed credential source for this device.
    pub fn credential_source(&self) -> FileCredentialSource {
        let source = FileCredentialSource::new(&self.password_file);
        match self.privileged_file() {
            Some(path) => source.with_privileged(path),
            None => source,
        }
    }

    fn privileged_file(&self) -> Option<PathBuf> {
        self.privileged_password_file
            .clone()
            .or_else(|| self.extra_expect_params.first().map(PathBuf::from))
    }

    /// Per-step timeout override.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn invalid(message: &str) -> crate::Error {
    ConfigError::Invalid {
        message: message.to_string(),
    }
    .into()
}
