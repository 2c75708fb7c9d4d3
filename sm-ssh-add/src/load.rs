//! `sm-ssh-add load`

use std::io::Write;

use anyhow::{Context as _, Result};
use sm_ssh_agent::{AgentClient, AgentError};
use sm_ssh_core::SecretProvider;
use sm_ssh_core::config::PathConfig;
use sm_ssh_core::prompt::SecretPrompt;
use tracing::{debug, warn};

use crate::cli::{CommandError, LoadArgs};

/// The paths a `load` invocation works through, in order.
pub fn resolve_paths(args: &LoadArgs, config: &PathConfig) -> Result<Vec<String>, CommandError> {
    if let Some(path) = &args.path {
        return Ok(vec![path.clone()]);
    }
    let paths = config.paths();
    if paths.is_empty() {
        return Err(CommandError::NoPathsConfigured);
    }
    Ok(paths.to_vec())
}

/// Load every path into the agent, then close the agent connection.
pub async fn run(
    paths: &[String],
    provider: &dyn SecretProvider,
    agent: &mut AgentClient,
    prompt: &dyn SecretPrompt,
    out: &mut dyn Write,
) -> Result<()> {
    let result = load_paths(paths, provider, agent, prompt, out).await;
    if let Err(e) = agent.close() {
        warn!("failed to close ssh-agent connection: {e}");
    }
    result
}

/// Stops at the first path that cannot be fetched or added.  A key the
/// agent already holds is reported and skipped.
async fn load_paths(
    paths: &[String],
    provider: &dyn SecretProvider,
    agent: &mut AgentClient,
    prompt: &dyn SecretPrompt,
    out: &mut dyn Write,
) -> Result<()> {
    for path in paths {
        let material = provider
            .get(path)
            .await
            .with_context(|| format!("failed to load key from {path}"))?;

        let passphrase = if material.requires_passphrase {
            let label = format!("Enter passphrase for {path}");
            Some(
                prompt
                    .read_secret(&label)
                    .await
                    .with_context(|| format!("failed to read passphrase for {path}"))?,
            )
        } else {
            None
        };

        match agent
            .add_key(&material, passphrase.as_ref().map(|p| p.as_bytes()))
            .await
        {
            Ok(fingerprint) => {
                debug!(%path, %fingerprint, "loaded");
                writeln!(out, "Loaded key from {path} into ssh-agent")?;
            }
            Err(AgentError::AlreadyLoaded { fingerprint }) => {
                debug!(%path, %fingerprint, "already loaded");
                writeln!(out, "Key from {path} already loaded in agent")?;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("failed to add key from {path}")));
            }
        }
    }
    Ok(())
}
