//! In-process agent session for tests.
//!
//! Keeps identities in a shared list and, like a permissive agent, appends
//! whatever it is given without checking for duplicates.  Clones share the
//! same list so one handle can serve a listener while the test inspects it.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use ssh_agent_lib::agent::Session;
use ssh_agent_lib::error::AgentError;
use ssh_agent_lib::proto::{AddIdentity, Credential, Identity, RemoveIdentity};
use ssh_key::PrivateKey;
use ssh_key::public::KeyData;
use tracing::debug;

fn other_err(msg: impl Into<String>) -> AgentError {
    AgentError::other(io::Error::other(msg.into()))
}

#[derive(Clone, Debug, Default)]
pub struct MemoryAgent {
    identities: Arc<Mutex<Vec<(KeyData, String)>>>,
}

impl MemoryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(KeyData, String)>> {
        self.identities.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn comments(&self) -> Vec<String> {
        self.entries().iter().map(|(_, c)| c.clone()).collect()
    }
}

#[ssh_agent_lib::async_trait]
impl Session for MemoryAgent {
    async fn request_identities(&mut self) -> Result<Vec<Identity>, AgentError> {
        let identities: Vec<Identity> = self
            .entries()
            .iter()
            .map(|(pubkey, comment)| Identity {
                pubkey: pubkey.clone(),
                comment: comment.clone(),
            })
            .collect();
        debug!(count = identities.len(), "request_identities");
        Ok(identities)
    }

    async fn add_identity(&mut self, identity: AddIdentity) -> Result<(), AgentError> {
        let Credential::Key { privkey, comment } = identity.credential else {
            return Err(other_err("only plain keys are supported"));
        };
        let key = PrivateKey::new(privkey, comment.clone())
            .map_err(|e| other_err(format!("invalid key: {e}")))?;
        self.entries().push((key.public_key().key_data().clone(), comment));
        Ok(())
    }

    async fn remove_identity(&mut self, identity: RemoveIdentity) -> Result<(), AgentError> {
        let mut identities = self.entries();
        let before = identities.len();
        identities.retain(|(pubkey, _)| *pubkey != identity.pubkey);
        if identities.len() == before {
            return Err(other_err("key not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ssh_key::Algorithm;

    use super::*;

    fn add_request(comment: &str) -> (AddIdentity, KeyData) {
        let key = PrivateKey::random(&mut ssh_key::rand_core::OsRng, Algorithm::Ed25519).unwrap();
        let pubkey = key.public_key().key_data().clone();
        let request = AddIdentity {
            credential: Credential::Key {
                privkey: key.key_data().clone(),
                comment: comment.to_string(),
            },
        };
        (request, pubkey)
    }

    #[tokio::test]
    async fn session_calls_share_state_across_clones() {
        let agent = MemoryAgent::new();
        let mut session = agent.clone();

        let (request, pubkey) = add_request("one");
        session.add_identity(request).await.unwrap();
        let (request, _) = add_request("two");
        session.add_identity(request).await.unwrap();

        let listed = session.request_identities().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].pubkey, pubkey);
        assert_eq!(agent.comments(), vec!["one".to_string(), "two".to_string()]);

        session
            .remove_identity(RemoveIdentity { pubkey: pubkey.clone() })
            .await
            .unwrap();
        assert_eq!(agent.comments(), vec!["two".to_string()]);
        assert!(session.remove_identity(RemoveIdentity { pubkey }).await.is_err());
    }
}
