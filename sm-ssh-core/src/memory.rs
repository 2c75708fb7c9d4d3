//! In-memory stand-ins for the provider and prompt capabilities.
//!
//! Compiled for this crate's tests and, through the `test-util` feature, for
//! the tests of downstream crates.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use zeroize::Zeroizing;

use crate::prompt::{PromptError, SecretPrompt};
use crate::{KeyMaterial, ProviderError, SecretProvider};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A [`SecretProvider`] backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryProvider {
    entries: Mutex<HashMap<String, KeyMaterial>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, path: &str, material: KeyMaterial) -> Self {
        lock(&self.entries).insert(path.to_string(), material);
        self
    }

    pub fn entry(&self, path: &str) -> Option<KeyMaterial> {
        lock(&self.entries).get(path).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl SecretProvider for MemoryProvider {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn get(&self, path: &str) -> Result<KeyMaterial, ProviderError> {
        if path.is_empty() {
            return Err(ProviderError::InvalidPath);
        }
        lock(&self.entries)
            .get(path)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                path: path.to_string(),
            })
    }

    async fn store(&self, path: &str, material: &KeyMaterial) -> Result<(), ProviderError> {
        if path.is_empty() {
            return Err(ProviderError::InvalidPath);
        }
        if !material.is_complete() {
            return Err(ProviderError::InvalidFormat {
                path: path.to_string(),
                reason: "private_key and public_key must not be empty".into(),
            });
        }
        lock(&self.entries).insert(path.to_string(), material.clone());
        Ok(())
    }

    async fn check_exists(&self, path: &str) -> Result<bool, ProviderError> {
        if path.is_empty() {
            return Err(ProviderError::InvalidPath);
        }
        Ok(lock(&self.entries).contains_key(path))
    }
}

/// A [`SecretPrompt`] that replays canned answers in order and records
/// everything it was asked and told.
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    labels: Mutex<Vec<String>>,
    notices: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            labels: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
        }
    }

    /// A prompt that fails every read.
    pub fn silent() -> Self {
        Self::new(std::iter::empty::<String>())
    }

    /// Labels of every `read_secret` call so far.
    pub fn labels(&self) -> Vec<String> {
        lock(&self.labels).clone()
    }

    pub fn notices(&self) -> Vec<String> {
        lock(&self.notices).clone()
    }

    /// Answers not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.answers).len()
    }
}

#[async_trait::async_trait]
impl SecretPrompt for ScriptedPrompt {
    async fn notice(&self, message: &str) {
        lock(&self.notices).push(message.to_string());
    }

    async fn read_secret(&self, label: &str) -> Result<Zeroizing<String>, PromptError> {
        lock(&self.labels).push(label.to_string());
        lock(&self.answers)
            .pop_front()
            .map(Zeroizing::new)
            .ok_or_else(|| {
                PromptError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("no scripted answer for '{label}'"),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material() -> KeyMaterial {
        KeyMaterial {
            private_key: Zeroizing::new("pem".to_string()),
            public_key: "ssh-ed25519 AAAA\n".to_string(),
            requires_passphrase: false,
            comment: String::new(),
        }
    }

    #[tokio::test]
    async fn memory_provider_round_trip() {
        let provider = MemoryProvider::new();
        assert!(!provider.check_exists("a").await.unwrap());

        provider.store("a", &material()).await.unwrap();
        assert!(provider.check_exists("a").await.unwrap());
        assert_eq!(provider.get("a").await.unwrap(), material());
    }

    #[tokio::test]
    async fn memory_provider_missing_and_empty_paths() {
        let provider = MemoryProvider::new();
        assert!(matches!(
            provider.get("nope").await,
            Err(ProviderError::NotFound { .. })
        ));
        assert!(matches!(
            provider.store("", &material()).await,
            Err(ProviderError::InvalidPath)
        ));

        let mut partial = material();
        partial.public_key.clear();
        assert!(matches!(
            provider.store("b", &partial).await,
            Err(ProviderError::InvalidFormat { .. })
        ));
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn scripted_prompt_replays_answers_in_order() {
        let prompt = ScriptedPrompt::new(["first", "second"]);
        assert_eq!(prompt.remaining(), 2);

        assert_eq!(prompt.read_secret("one").await.unwrap().as_str(), "first");
        assert_eq!(prompt.remaining(), 1);
        assert_eq!(prompt.read_secret("two").await.unwrap().as_str(), "second");
        assert!(prompt.read_secret("three").await.is_err());

        assert_eq!(prompt.remaining(), 0);
        assert_eq!(prompt.labels(), vec!["one", "two", "three"]);
    }
}
