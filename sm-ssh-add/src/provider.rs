use sm_ssh_core::config::{ProviderConfig, ProviderKind};
use sm_ssh_core::prompt::SecretPrompt;
use sm_ssh_core::{ProviderError, SecretProvider};
use sm_ssh_vault::VaultProvider;
use tracing::debug;

/// Build the authenticated provider selected by `config`.
pub async fn init_provider(
    config: &ProviderConfig,
    prompt: &dyn SecretPrompt,
) -> Result<Box<dyn SecretProvider>, ProviderError> {
    let provider: Box<dyn SecretProvider> = match config.kind {
        ProviderKind::Vault => Box::new(VaultProvider::connect(&config.vault, prompt).await?),
    };
    debug!(kind = provider.kind(), "secret provider ready");
    Ok(provider)
}
