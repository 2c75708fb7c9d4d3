//! Client side of the OpenSSH agent protocol.

use std::io;
use std::path::{Path, PathBuf};

use sm_ssh_core::KeyMaterial;
use ssh_agent_lib::agent::Session;
use ssh_agent_lib::client::Client;
use ssh_agent_lib::error::AgentError as ProtoError;
use ssh_agent_lib::proto::{AddIdentity, Credential, RemoveIdentity};
use ssh_key::public::KeyData;
use ssh_key::{HashAlg, PrivateKey};
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("ssh-agent not found: SSH_AUTH_SOCK is not set")]
    NotFound,
    #[error("failed to connect to ssh-agent at {}: {source}", .path.display())]
    Connection { path: PathBuf, source: io::Error },
    #[error("failed to decrypt private key: {0}")]
    Decryption(String),
    #[error("failed to parse private key: {0}")]
    KeyParse(String),
    #[error("key {fingerprint} is already loaded in the agent")]
    AlreadyLoaded { fingerprint: String },
    #[error("ssh-agent request failed: {0}")]
    Protocol(#[from] ProtoError),
    #[error("agent connection is closed")]
    Closed,
}

/// One identity as reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentKeyRecord {
    pub key: KeyData,
    pub comment: String,
    /// `SHA256:<base64>` over the public key blob.
    pub fingerprint: String,
}

pub fn fingerprint(key: &KeyData) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

/// A single connection to a running ssh-agent.
///
/// Holds the session as a boxed [`Session`] so tests can substitute an
/// in-process agent for the socket client.
pub struct AgentClient {
    session: Option<Box<dyn Session>>,
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("open", &self.session.is_some())
            .finish()
    }
}

impl AgentClient {
    /// Connect to the agent listening on `socket` (normally `$SSH_AUTH_SOCK`).
    pub async fn connect(socket: Option<&Path>) -> Result<Self, AgentError> {
        let path = socket.ok_or(AgentError::NotFound)?;
        let stream = tokio::net::UnixStream::connect(path)
            .await
            .map_err(|source| AgentError::Connection {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(socket = %path.display(), "connected to ssh-agent");
        Ok(Self::from_session(Client::new(stream)))
    }

    pub fn from_session(session: impl Session + 'static) -> Self {
        Self {
            session: Some(Box::new(session)),
        }
    }

    fn session(&mut self) -> Result<&mut Box<dyn Session>, AgentError> {
        self.session.as_mut().ok_or(AgentError::Closed)
    }

    pub async fn list(&mut self) -> Result<Vec<AgentKeyRecord>, AgentError> {
        let identities = self.session()?.request_identities().await?;
        Ok(identities
            .into_iter()
            .map(|id| AgentKeyRecord {
                fingerprint: fingerprint(&id.pubkey),
                key: id.pubkey,
                comment: id.comment,
            })
            .collect())
    }

    /// Decode `material` and hand the private key to the agent.
    ///
    /// Returns the SHA-256 fingerprint of the added key.  If the agent already
    /// holds a key with that fingerprint nothing is sent and
    /// [`AgentError::AlreadyLoaded`] is returned.  The key is added without a
    /// lifetime or confirmation constraint.
    pub async fn add_key(
        &mut self,
        material: &KeyMaterial,
        passphrase: Option<&[u8]>,
    ) -> Result<String, AgentError> {
        let key = decode_private_key(&material.private_key, passphrase)?;
        let fp = fingerprint(key.public_key().key_data());

        if self.list().await?.iter().any(|r| r.fingerprint == fp) {
            debug!(fingerprint = %fp, "key already present in agent");
            return Err(AgentError::AlreadyLoaded { fingerprint: fp });
        }

        let comment = if material.comment.is_empty() {
            key.comment().to_string()
        } else {
            material.comment.clone()
        };

        self.session()?
            .add_identity(AddIdentity {
                credential: Credential::Key {
                    privkey: key.key_data().clone(),
                    comment,
                },
            })
            .await?;

        debug!(fingerprint = %fp, "key added to agent");
        Ok(fp)
    }

    pub async fn remove(&mut self, key: &KeyData) -> Result<(), AgentError> {
        self.session()?
            .remove_identity(RemoveIdentity {
                pubkey: key.clone(),
            })
            .await?;
        debug!(fingerprint = %fingerprint(key), "key removed from agent");
        Ok(())
    }

    /// Drop the connection.  Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), AgentError> {
        if self.session.take().is_some() {
            debug!("ssh-agent connection closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }
}

/// Parse OpenSSH PEM text, decrypting it when it is protected.
pub fn decode_private_key(pem: &str, passphrase: Option<&[u8]>) -> Result<PrivateKey, AgentError> {
    let key = PrivateKey::from_openssh(pem).map_err(|e| AgentError::KeyParse(e.to_string()))?;
    if !key.is_encrypted() {
        return Ok(key);
    }

    let passphrase = passphrase.filter(|p| !p.is_empty()).ok_or_else(|| {
        AgentError::Decryption("key is passphrase-protected but no passphrase was given".into())
    })?;
    key.decrypt(passphrase)
        .map_err(|_| AgentError::Decryption("incorrect passphrase".into()))
}
