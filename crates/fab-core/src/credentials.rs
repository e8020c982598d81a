//! Local controller credential store
//!
//! Persists `{base_url, username, password}` between runs as a small TOML
//! file under the user config directory. The file is written with mode 0600.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::mask_secret;
use crate::error::{Error, Result};

/// Credentials as persisted on disk
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &mask_secret(&self.password))
            .finish()
    }
}

impl StoredCredentials {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let creds = Self {
            base_url: base_url.into().trim().to_string(),
            username: username.into().trim().to_string(),
            password: password.into(),
        };
        if creds.base_url.is_empty() || creds.username.is_empty() || creds.password.is_empty() {
            return Err(Error::InvalidArgument(
                "base URL, username and password are all required".to_string(),
            ));
        }
        Ok(creds)
    }
}

/// File-backed credential store
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the platform config directory (`~/.config/fabric-agent/credentials.toml`)
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::credential_store("no user config directory available"))?;
        Ok(Self::at(dir.join("fabric-agent").join("credentials.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored credentials; `None` when nothing has been saved yet
    pub fn load(&self) -> Result<Option<StoredCredentials>> {
        if !self.path.exists() {
            debug!("No credential store at {}", self.path.display());
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let creds: StoredCredentials = toml::from_str(&content)?;
        Ok(Some(creds))
    }

    /// Save credentials, replacing any previous entry
    pub fn save(&self, creds: &StoredCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(creds)?;
        write_private(&self.path, content.as_bytes())?;
        info!(
            "Saved controller credentials for {}@{} to {}",
            creds.username,
            creds.base_url,
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)?;
    Ok(())
}
