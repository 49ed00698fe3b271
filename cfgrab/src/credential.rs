//! Secret material for device sessions.
//!
//! A [`Credential`] is an opaque byte string with a [`CredentialRole`]. It is
//! loaded once from a [`CredentialSource`], moved into the session that needs
//! it and zeroed when dropped. Its `Debug` output is redacted.

use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::zeroize::Zeroize;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// Logical role of a credential within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRole {
    /// Password for the initial login.
    Login,
    /// Independently sourced password for privileged/extended mode.
    Privileged,
}

impl fmt::Display for CredentialRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialRole::Login => write!(f, "login"),
            CredentialRole::Privileged => write!(f, "privileged"),
        }
    }
}

/// A secret byte string plus its role.
pub struct Credential {
    role: CredentialRole,
    secret: SecretBox<[u8]>,
}

impl Credential {
    /// Wrap raw secret bytes.
    pub fn new(role: CredentialRole, secret: impl Into<Vec<u8>>) -> Self {
        let mut secret: Vec<u8> = secret.into();
        Self {
            role,
            secret: SecretBox::new(seal(&mut secret)),
        }
    }

    /// Build a credential from the raw contents of a credential file.
    ///
    /// Exactly one trailing `\n` is removed, nothing else is touched.
    pub fn from_file_contents(role: CredentialRole, mut contents: Vec<u8>) -> Self {
        if contents.last() == Some(&b'\n') {
            contents.pop();
        }
        Self::new(role, contents)
    }

    /// The role of this credential.
    pub fn role(&self) -> CredentialRole {
        self.role
    }

    /// Borrow the secret bytes.
    ///
    /// Callers must not copy the result into logs or captured output.
    pub fn expose(&self) -> &[u8] {
        self.secret.expose_secret()
    }
}

/// Copy into an exact-size allocation and wipe the source, spare capacity included.
fn seal(bytes: &mut Vec<u8>) -> Box<[u8]> {
    let sealed = Box::<[u8]>::from(bytes.as_slice());
    bytes.zeroize();
    sealed
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("role", &self.role)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Loads secret material from an external store.
pub trait CredentialSource: Send + Sync {
    /// Load the credential for a role.
    fn load(&self, role: CredentialRole) -> Result<Credential, CredentialError>;

    /// Whether this source has anything configured for the role.
    fn provides(&self, role: CredentialRole) -> bool;
}

/// Credential source backed by plain files, one per role.
#[derive(Debug, Clone)]
pub struct FileCredentialSource {
    login: PathBuf,
    privileged: Option<PathBuf>,
}

impl FileCredentialSource {
    /// Create a source with a login credential file.
    pub fn new(login: impl Into<PathBuf>) -> Self {
        Self {
            login: login.into(),
            privileged: None,
        }
    }

    /// Set the secondary (privileged) credential file.
    pub fn with_privileged(mut self, path: impl Into<PathBuf>) -> Self {
        self.privileged = Some(path.into());
        self
    }

    fn path(&self, role: CredentialRole) -> Option<&Path> {
        match role {
            CredentialRole::Login => Some(&self.login),
            CredentialRole::Privileged => self.privileged.as_deref(),
        }
    }
}

impl CredentialSource for FileCredentialSource {
    fn load(&self, role: CredentialRole) -> Result<Credential, CredentialError> {
        let path = self
            .path(role)
            .ok_or(CredentialError::NotConfigured(role))?;
        let contents = std::fs::read(path).map_err(|source| CredentialError::Read {
            role,
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Credential::from_file_contents(role, contents))
    }

    fn provides(&self, role: CredentialRole) -> bool {
        self.path(role).is_some()
    }
}

/// The credentials owned by one session, each handed out at most once.
#[derive(Debug, Default)]
pub struct CredentialSet {
    login: Option<Credential>,
    privileged: Option<Credential>,
}

impl CredentialSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every role the source provides.
    pub fn load_from(source: &dyn CredentialSource) -> Result<Self, CredentialError> {
        let mut set = Self::new();
        for role in [CredentialRole::Login, CredentialRole::Privileged] {
            if source.provides(role) {
                set.insert(source.load(role)?);
            }
        }
        Ok(set)
    }

    /// Add a credential, replacing any previous one with the same role.
    pub fn insert(&mut self, credential: Credential) {
        match credential.role() {
            CredentialRole::Login => self.login = Some(credential),
            CredentialRole::Privileged => self.privileged = Some(credential),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, credential: Credential) -> Self {
        self.insert(credential);
        self
    }

    /// Whether a credential for the role is present.
    pub fn contains(&self, role: CredentialRole) -> bool {
        self.slot(role).is_some()
    }

    /// Borrow a credential without consuming it.
    pub fn get(&self, role: CredentialRole) -> Option<&Credential> {
        self.slot(role).as_ref()
    }

    /// Remove and return the credential for a role.
    pub fn take(&mut self, role: CredentialRole) -> Option<Credential> {
        match role {
            CredentialRole::Login => self.login.take(),
            CredentialRole::Privileged => self.privileged.take(),
        }
    }

    fn slot(&self, role: CredentialRole) -> &Option<Credential> {
        match role {
            CredentialRole::Login => &self.login,
            CredentialRole::Privileged => &self.privileged,
        }
    }
}
