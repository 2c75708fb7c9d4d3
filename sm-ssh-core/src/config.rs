//! Persisted configuration and per-process provider settings.
//!
//! The config file is a small JSON document:
//!
//! ```json
//! {
//!   "default_provider": "vault",
//!   "vault_paths": ["secret/data/ssh/github"],
//!   "vault_approle_role_id": "8c0b…"
//! }
//! ```
//!
//! It lives at `$XDG_CONFIG_HOME/sm-ssh-add.json` (default:
//! `~/.config/sm-ssh-add.json`).  Everything read from the process
//! environment is captured once into an [`Environment`] so the rest of the
//! program can be driven by injected values.

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

pub const CONFIG_FILE_NAME: &str = "sm-ssh-add.json";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(
        "config file not found at {} (create it with {{\"default_provider\": \"vault\"}})",
        .0.display()
    )]
    NotFound(PathBuf),
    #[error("cannot determine config directory (neither XDG_CONFIG_HOME nor HOME is set)")]
    NoConfigDir,
    #[error("failed to read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config file {} (invalid JSON): {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("default_provider cannot be empty")]
    EmptyProvider,
    #[error("invalid provider '{0}' (known providers: vault)")]
    InvalidProvider(String),
    #[error("failed to write config file {}: {source}", .path.display())]
    Persist { path: PathBuf, source: io::Error },
}

// ---------------------------------------------------------------------------
// Provider kind
// ---------------------------------------------------------------------------

/// The closed set of secret backends this tool can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// HashiCorp Vault or OpenBao (same HTTP API).
    Vault,
}

impl ProviderKind {
    pub const ALL: &'static [ProviderKind] = &[ProviderKind::Vault];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vault => "vault",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ConfigError::EmptyProvider);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidProvider(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Config document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub default_provider: ProviderKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vault_paths: Vec<String>,
    /// When set, Vault authentication uses AppRole instead of a static token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_approle_role_id: Option<String>,
}

/// On-disk shape before validation.  `default_provider` is read as a plain
/// string so an empty or unknown value produces a precise error.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    default_provider: String,
    #[serde(default)]
    vault_paths: Option<Vec<String>>,
    #[serde(default)]
    vault_approle_role_id: Option<String>,
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let default_provider = raw.default_provider.parse()?;
        Ok(Self {
            default_provider,
            vault_paths: raw.vault_paths.unwrap_or_default(),
            vault_approle_role_id: raw.vault_approle_role_id.filter(|id| !id.is_empty()),
        })
    }
}

impl Config {
    pub fn new(default_provider: ProviderKind) -> Self {
        Self {
            default_provider,
            vault_paths: Vec::new(),
            vault_approle_role_id: None,
        }
    }

    /// The batch-load paths recorded for the selected provider.
    pub fn paths(&self) -> &[String] {
        match self.default_provider {
            ProviderKind::Vault => &self.vault_paths,
        }
    }

    fn paths_mut(&mut self) -> &mut Vec<String> {
        match self.default_provider {
            ProviderKind::Vault => &mut self.vault_paths,
        }
    }

    pub fn approle_role_id(&self) -> Option<&str> {
        self.vault_approle_role_id.as_deref()
    }
}

// ---------------------------------------------------------------------------
// PathConfig: the config document bound to its file
// ---------------------------------------------------------------------------

/// A loaded [`Config`] together with the file it came from.
///
/// Only [`add_path`](Self::add_path) mutates it, and every mutation is
/// written straight back to disk.
#[derive(Debug, Clone)]
pub struct PathConfig {
    file: PathBuf,
    config: Config,
}

impl PathConfig {
    pub fn new(file: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            file: file.into(),
            config,
        }
    }

    /// Read and validate the config file at `file`.
    pub fn load(file: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let file = file.into();
        let raw = match std::fs::read_to_string(&file) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(file));
            }
            Err(source) => return Err(ConfigError::Read { path: file, source }),
        };

        let parsed: RawConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: file.clone(),
            source,
        })?;
        let config = Config::try_from(parsed)?;

        debug!(
            path = %file.display(),
            provider = %config.default_provider,
            paths = config.paths().len(),
            "config loaded"
        );
        Ok(Self { file, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Configured paths in insertion order; empty when none are set.
    pub fn paths(&self) -> &[String] {
        self.config.paths()
    }

    /// Append `path` and persist the whole document.
    ///
    /// Returns `Ok(false)` without touching disk when `path` is already
    /// present.  On a write failure the in-memory list keeps the new entry and
    /// [`ConfigError::Persist`] is returned.
    pub fn add_path(&mut self, path: &str) -> Result<bool, ConfigError> {
        let paths = self.config.paths_mut();
        if paths.iter().any(|p| p == path) {
            debug!(%path, "path already configured");
            return Ok(false);
        }
        paths.push(path.to_string());
        self.save()?;
        debug!(%path, file = %self.file.display(), "path added to config");
        Ok(true)
    }

    /// Write the document to its file (mode `0600`, write-then-rename).
    pub fn save(&self) -> Result<(), ConfigError> {
        let persist_err = |source| ConfigError::Persist {
            path: self.file.clone(),
            source,
        };

        let mut data = serde_json::to_vec_pretty(&self.config)
            .map_err(|e| persist_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        data.push(b'\n');

        if let Some(parent) = self.file.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(persist_err)?;
        }
        write_private_file(&self.file, &data).map_err(persist_err)
    }
}

/// Write `data` to `path` with Unix mode `0600`, replacing any existing file.
///
/// The bytes go to a sibling temp file first and are renamed into place, so
/// readers never observe a partial document.
fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::io::Write;

    let tmp_path = path.with_extension("json.tmp");
    {
        #[cfg(unix)]
        let mut f = {
            use std::os::unix::fs::OpenOptionsExt;
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&tmp_path)?
        };
        #[cfg(not(unix))]
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        f.write_all(data)?;
        f.sync_all()?;
    }

    std::fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp_path);
    })
}

// ---------------------------------------------------------------------------
// Process environment
// ---------------------------------------------------------------------------

/// Every environment variable the tool consumes, captured once at startup.
#[derive(Clone, Default)]
pub struct Environment {
    /// `BAO_ADDR`, falling back to `VAULT_ADDR`.
    pub vault_addr: Option<String>,
    /// `BAO_TOKEN`, falling back to `VAULT_TOKEN`.
    pub vault_token: Option<Zeroizing<String>>,
    /// `VAULT_APPROLE_SECRET_ID`.
    pub approle_secret_id: Option<Zeroizing<String>>,
    /// `SSH_AUTH_SOCK`.
    pub agent_socket: Option<PathBuf>,
    /// `$XDG_CONFIG_HOME`, or `$HOME/.config`.
    pub config_dir: Option<PathBuf>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.  Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let first = |names: &[&str]| names.iter().find_map(|n| var(n));

        let config_dir = var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| var("HOME").map(|h| PathBuf::from(h).join(".config")));

        Self {
            vault_addr: first(&["BAO_ADDR", "VAULT_ADDR"]),
            vault_token: first(&["BAO_TOKEN", "VAULT_TOKEN"]).map(Zeroizing::new),
            approle_secret_id: var("VAULT_APPROLE_SECRET_ID").map(Zeroizing::new),
            agent_socket: var("SSH_AUTH_SOCK").map(PathBuf::from),
            config_dir,
        }
    }

    /// Location of the config file.
    pub fn config_path(&self) -> Result<PathBuf, ConfigError> {
        self.config_dir
            .as_ref()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("vault_addr", &self.vault_addr)
            .field("vault_token", &self.vault_token.as_ref().map(|_| "[redacted]"))
            .field(
                "approle_secret_id",
                &self.approle_secret_id.as_ref().map(|_| "[redacted]"),
            )
            .field("agent_socket", &self.agent_socket)
            .field("config_dir", &self.config_dir)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Provider configuration
// ---------------------------------------------------------------------------

/// Connection settings for the Vault backend.
#[derive(Clone, Default)]
pub struct VaultSettings {
    pub address: Option<String>,
    pub token: Option<Zeroizing<String>>,
    pub role_id: Option<String>,
    /// Pre-supplied AppRole secret-id; prompted for when absent.
    pub secret_id: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for VaultSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSettings")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .field("role_id", &self.role_id)
            .field("secret_id", &self.secret_id.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// The selected backend and everything needed to authenticate against it.
/// Immutable for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub vault: VaultSettings,
}

impl ProviderConfig {
    pub fn resolve(config: &Config, env: &Environment) -> Self {
        Self {
            kind: config.default_provider,
            vault: VaultSettings {
                address: env.vault_addr.clone(),
                token: env.vault_token.clone(),
                role_id: config.approle_role_id().map(str::to_string),
                secret_id: env.approle_secret_id.clone(),
            },
        }
    }
}
