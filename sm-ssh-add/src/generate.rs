//! `sm-ssh-add generate`

use std::io::Write;

use anyhow::{Context as _, Result};
use sm_ssh_core::SecretProvider;
use sm_ssh_core::config::PathConfig;
use sm_ssh_core::prompt::{SecretPrompt, read_new_passphrase};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::cli::{CommandError, GenerateArgs};

pub async fn run(
    args: &GenerateArgs,
    provider: &dyn SecretProvider,
    prompt: &dyn SecretPrompt,
    config: &mut PathConfig,
    out: &mut dyn Write,
) -> Result<()> {
    let path = args.path.as_str();

    if !args.regenerate {
        let exists = provider
            .check_exists(path)
            .await
            .with_context(|| format!("failed to check for existing key at {path}"))?;
        if exists {
            return Err(CommandError::DuplicateKey {
                path: path.to_string(),
            }
            .into());
        }
    }

    let passphrase = if args.require_passphrase {
        read_new_passphrase(prompt)
            .await
            .context("failed to read passphrase")?
    } else {
        Zeroizing::new(String::new())
    };

    let material = sm_ssh_agent::generate(&args.comment, passphrase.as_bytes())
        .context("key generation failed")?;
    drop(passphrase);

    provider
        .store(path, &material)
        .await
        .with_context(|| format!("failed to store key at {path}"))?;
    debug!(%path, protected = material.requires_passphrase, "key stored");

    if args.save_path {
        match config.add_path(path) {
            Ok(true) => debug!(%path, "path saved to config"),
            Ok(false) => debug!(%path, "path already in config"),
            Err(e) => warn!("key stored but path not saved to config: {e}"),
        }
    }

    write!(out, "{}", material.public_key)?;
    writeln!(out, "Stored SSH key at {path}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use sm_ssh_agent::client::decode_private_key;
    use sm_ssh_core::KeyMaterial;
    use sm_ssh_core::config::{CONFIG_FILE_NAME, Config, ProviderKind};
    use sm_ssh_core::memory::{MemoryProvider, ScriptedPrompt};
    use sm_ssh_core::prompt::PromptError;

    use super::*;

    const PATH: &str = "secret/data/ssh/x";

    fn gen_args(comment: &str) -> GenerateArgs {
        GenerateArgs {
            path: PATH.to_string(),
            comment: comment.to_string(),
            ..Default::default()
        }
    }

    fn temp_config(dir: &tempfile::TempDir) -> PathConfig {
        PathConfig::new(
            dir.path().join(CONFIG_FILE_NAME),
            Config::new(ProviderKind::Vault),
        )
    }

    async fn run_with(
        args: &GenerateArgs,
        provider: &MemoryProvider,
        prompt: &ScriptedPrompt,
        config: &mut PathConfig,
    ) -> (Result<()>, String) {
        let mut out = Vec::new();
        let result = run(args, provider, prompt, config, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn generates_and_stores_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(&dir);
        let provider = MemoryProvider::new();

        let (result, out) = run_with(
            &gen_args("me@host"),
            &provider,
            &ScriptedPrompt::silent(),
            &mut config,
        )
        .await;
        result.unwrap();

        let stored = provider.entry(PATH).unwrap();
        assert!(!stored.requires_passphrase);
        assert_eq!(stored.comment, "me@host");
        assert_eq!(
            out,
            format!("{}Stored SSH key at {PATH}\n", stored.public_key)
        );
        // Without --save-path the config is left alone.
        assert!(config.paths().is_empty());
        assert!(!config.file().exists());
    }

    #[tokio::test]
    async fn existing_key_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(&dir);
        let original = sm_ssh_agent::generate("a", b"").unwrap();
        let provider = MemoryProvider::new().with_entry(PATH, original.clone());

        let (result, out) = run_with(
            &gen_args("b"),
            &provider,
            &ScriptedPrompt::silent(),
            &mut config,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<CommandError>(),
            Some(&CommandError::DuplicateKey {
                path: PATH.to_string()
            })
        );
        assert!(err.to_string().contains(PATH));
        assert!(err.to_string().contains("--regenerate"));
        assert_eq!(provider.entry(PATH).unwrap(), original);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn regenerate_replaces_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(&dir);
        let provider =
            MemoryProvider::new().with_entry(PATH, sm_ssh_agent::generate("initial", b"").unwrap());

        let args = GenerateArgs {
            regenerate: true,
            ..gen_args("updated")
        };
        let (result, _) =
            run_with(&args, &provider, &ScriptedPrompt::silent(), &mut config).await;
        result.unwrap();

        assert_eq!(provider.entry(PATH).unwrap().comment, "updated");
    }

    #[tokio::test]
    async fn passphrase_protects_the_stored_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(&dir);
        let provider = MemoryProvider::new();
        let prompt = ScriptedPrompt::new(["hunter2", "hunter2"]);

        let args = GenerateArgs {
            require_passphrase: true,
            ..gen_args("me@host")
        };
        let (result, _) = run_with(&args, &provider, &prompt, &mut config).await;
        result.unwrap();

        let stored: KeyMaterial = provider.entry(PATH).unwrap();
        assert!(stored.requires_passphrase);
        assert!(decode_private_key(&stored.private_key, None).is_err());
        assert!(decode_private_key(&stored.private_key, Some(b"hunter2".as_slice())).is_ok());
    }

    #[tokio::test]
    async fn passphrase_mismatch_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(&dir);
        let provider = MemoryProvider::new();
        let prompt = ScriptedPrompt::new(["one", "two"]);

        let args = GenerateArgs {
            require_passphrase: true,
            ..gen_args("")
        };
        let (result, _) = run_with(&args, &provider, &prompt, &mut config).await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PromptError>(),
            Some(PromptError::Mismatch)
        ));
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn save_path_records_path_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(&dir);
        let provider = MemoryProvider::new();

        let args = GenerateArgs {
            save_path: true,
            regenerate: true,
            ..gen_args("")
        };
        for _ in 0..2 {
            let (result, _) =
                run_with(&args, &provider, &ScriptedPrompt::silent(), &mut config).await;
            result.unwrap();
        }

        assert_eq!(config.paths(), [PATH.to_string()]);
        let reloaded = PathConfig::load(config.file()).unwrap();
        assert_eq!(reloaded.paths(), [PATH.to_string()]);
    }

    #[tokio::test]
    async fn save_path_write_failure_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let mut config = PathConfig::new(
            blocker.join(CONFIG_FILE_NAME),
            Config::new(ProviderKind::Vault),
        );
        let provider = MemoryProvider::new();

        let args = GenerateArgs {
            save_path: true,
            ..gen_args("")
        };
        let (result, out) =
            run_with(&args, &provider, &ScriptedPrompt::silent(), &mut config).await;

        result.unwrap();
        assert!(provider.entry(PATH).is_some());
        assert_eq!(config.paths(), [PATH.to_string()]);
        assert!(out.contains("Stored SSH key at"));
    }
}
