mod bootstrap;
mod cli;
mod generate;
mod load;
mod provider;
mod tty;

use std::io;

use anyhow::{Context as _, Result};
use sm_ssh_agent::AgentClient;
use sm_ssh_core::config::{Environment, PathConfig, ProviderConfig};
use tracing_subscriber::EnvFilter;

use crate::tty::TtyPrompt;

/// Log filter variable; defaults to `warn`.
const LOG_ENV: &str = "SM_SSH_ADD_LOG";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Reset SIGPIPE to default so piping output to `head` etc. exits cleanly
    // instead of panicking with "broken pipe".
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    bootstrap::harden_process();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cmd) = args.first() else {
        eprintln!("usage: {}", cli::USAGE);
        std::process::exit(1);
    };

    let result = match cmd.as_str() {
        "generate" => cmd_generate(&args[1..]).await,
        "load" => cmd_load(&args[1..]).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("unknown command: {other}");
            eprintln!("usage: {}", cli::USAGE);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn print_help() {
    println!(
        "\
sm-ssh-add - keep SSH keys in a secret manager and load them into ssh-agent

USAGE:
    {usage}

COMMANDS:
    generate [--require-passphrase] [--save-path] [--regenerate] <path> [comment]
                                        Generate an Ed25519 key and store it at <path>
      --require-passphrase              Encrypt the private key with a passphrase
      --save-path                       Record <path> in the config for 'load --from-config'
      --regenerate                      Overwrite an existing key at <path>

    load [--from-config] <path>         Fetch the key at <path> and add it to ssh-agent
      --from-config                     Load every path recorded in the config instead

    help                                Show this help

ENVIRONMENT:
    BAO_ADDR / VAULT_ADDR               Vault or OpenBao address
    BAO_TOKEN / VAULT_TOKEN             Token (unless AppRole is configured)
    VAULT_APPROLE_SECRET_ID             AppRole secret-id (prompted for when unset)
    SSH_AUTH_SOCK                       ssh-agent socket
    {log_env}                      Log filter (default: warn)

CONFIG:
    $XDG_CONFIG_HOME/sm-ssh-add.json (default ~/.config/sm-ssh-add.json)
    {{\"default_provider\": \"vault\", \"vault_paths\": [...], \"vault_approle_role_id\": \"...\"}}

EXAMPLES:
    sm-ssh-add generate --save-path secret/data/ssh/github me@laptop
    sm-ssh-add load secret/data/ssh/github
    sm-ssh-add load --from-config",
        usage = cli::USAGE,
        log_env = LOG_ENV,
    );
}

fn load_config(env: &Environment) -> Result<PathConfig> {
    let path = env.config_path()?;
    Ok(PathConfig::load(path)?)
}

async fn cmd_generate(args: &[String]) -> Result<()> {
    let args = cli::parse_generate(args)?;
    let env = Environment::from_process();
    let mut config = load_config(&env)?;

    let prompt = TtyPrompt;
    let provider = provider::init_provider(&ProviderConfig::resolve(config.config(), &env), &prompt)
        .await
        .context("failed to initialise secret provider")?;

    generate::run(&args, provider.as_ref(), &prompt, &mut config, &mut io::stdout()).await
}

async fn cmd_load(args: &[String]) -> Result<()> {
    let args = cli::parse_load(args)?;
    let env = Environment::from_process();
    let config = load_config(&env)?;
    let paths = load::resolve_paths(&args, &config)?;

    let mut agent = AgentClient::connect(env.agent_socket.as_deref())
        .await
        .context("failed to connect to ssh-agent")?;

    let prompt = TtyPrompt;
    let provider = provider::init_provider(&ProviderConfig::resolve(config.config(), &env), &prompt)
        .await
        .context("failed to initialise secret provider")?;

    load::run(&paths, provider.as_ref(), &mut agent, &prompt, &mut io::stdout()).await
}
