//! Interactive secret entry.
//!
//! Commands never read the terminal directly; they go through a
//! [`SecretPrompt`] so tests can script the answers.

use zeroize::Zeroizing;

#[derive(thiserror::Error, Debug)]
pub enum PromptError {
    #[error("passphrases do not match")]
    Mismatch,
    #[error("{0} cannot be empty")]
    Empty(String),
    #[error("failed to read from terminal: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Somewhere to show notices and read hidden input from.
#[async_trait::async_trait]
pub trait SecretPrompt: Send + Sync {
    /// Show an informational line to the user (not a question).
    async fn notice(&self, message: &str);

    /// Ask for one hidden value.  `label` is shown as `"{label}: "`.
    async fn read_secret(&self, label: &str) -> Result<Zeroizing<String>, PromptError>;
}

/// Ask for a new passphrase twice and return it once both entries agree.
///
/// Rejects an empty passphrase: an empty value would produce an envelope
/// that is flagged as protected yet opens without any secret.
pub async fn read_new_passphrase(
    prompt: &dyn SecretPrompt,
) -> Result<Zeroizing<String>, PromptError> {
    let first = prompt.read_secret("Enter passphrase").await?;
    if first.is_empty() {
        return Err(PromptError::Empty("passphrase".to_string()));
    }
    let second = prompt.read_secret("Confirm passphrase").await?;
    if *first != *second {
        return Err(PromptError::Mismatch);
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ScriptedPrompt;

    #[tokio::test]
    async fn matching_entries_are_accepted() {
        let prompt = ScriptedPrompt::new(["correct horse", "correct horse"]);
        let pass = read_new_passphrase(&prompt).await.unwrap();
        assert_eq!(pass.as_str(), "correct horse");
        assert_eq!(
            prompt.labels(),
            vec!["Enter passphrase".to_string(), "Confirm passphrase".to_string()]
        );
    }

    #[tokio::test]
    async fn mismatched_entries_are_rejected() {
        let prompt = ScriptedPrompt::new(["one", "two"]);
        assert!(matches!(
            read_new_passphrase(&prompt).await,
            Err(PromptError::Mismatch)
        ));
    }

    #[tokio::test]
    async fn empty_passphrase_is_rejected_before_confirmation() {
        let prompt = ScriptedPrompt::new([""]);
        let err = read_new_passphrase(&prompt).await.unwrap_err();
        assert!(matches!(err, PromptError::Empty(_)));
        assert_eq!(err.to_string(), "passphrase cannot be empty");
        assert_eq!(prompt.labels().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_script_surfaces_as_error() {
        let prompt = ScriptedPrompt::new(["only-once"]);
        assert!(read_new_passphrase(&prompt).await.is_err());
    }
}
