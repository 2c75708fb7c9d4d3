//! Argument parsing for the `generate` and `load` subcommands.
//!
//! Flags are accepted with one or two leading dashes and may be interleaved
//! with positionals.  `--` ends flag parsing.

pub const USAGE: &str = "sm-ssh-add <generate|load|help> [args...]";
pub const GENERATE_USAGE: &str =
    "sm-ssh-add generate [--require-passphrase] [--save-path] [--regenerate] <path> [comment]";
pub const LOAD_USAGE: &str = "sm-ssh-add load [--from-config] <path>";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown flag: {0}")]
    UnknownFlag(String),
    #[error("too many arguments\nusage: {0}")]
    TooManyArguments(&'static str),
    #[error("cannot use both --from-config and direct path")]
    ConflictingArguments,
    #[error("no paths configured")]
    NoPathsConfigured,
    #[error("key already exists at {path} (use --regenerate to overwrite)")]
    DuplicateKey { path: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateArgs {
    pub require_passphrase: bool,
    pub save_path: bool,
    pub regenerate: bool,
    pub path: String,
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadArgs {
    pub from_config: bool,
    pub path: Option<String>,
}

/// Split `args` into recognised flag names and positionals.
fn split_args<'a>(
    args: &'a [String],
    known: &[&'static str],
) -> Result<(Vec<&'static str>, Vec<&'a str>), CommandError> {
    let mut flags = Vec::new();
    let mut positionals = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "--" {
            positionals.extend(iter.by_ref().map(String::as_str));
            break;
        }
        match arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) {
            Some(name) if !name.is_empty() => {
                let flag = known
                    .iter()
                    .copied()
                    .find(|k| *k == name)
                    .ok_or_else(|| CommandError::UnknownFlag(arg.clone()))?;
                flags.push(flag);
            }
            _ => positionals.push(arg.as_str()),
        }
    }
    Ok((flags, positionals))
}

pub fn parse_generate(args: &[String]) -> Result<GenerateArgs, CommandError> {
    let (flags, positionals) =
        split_args(args, &["require-passphrase", "save-path", "regenerate"])?;

    let (path, comment) = match positionals.as_slice() {
        [] => return Err(CommandError::Usage(GENERATE_USAGE)),
        [path] => (*path, ""),
        [path, comment] => (*path, *comment),
        _ => return Err(CommandError::TooManyArguments(GENERATE_USAGE)),
    };

    Ok(GenerateArgs {
        require_passphrase: flags.contains(&"require-passphrase"),
        save_path: flags.contains(&"save-path"),
        regenerate: flags.contains(&"regenerate"),
        path: path.to_string(),
        comment: comment.to_string(),
    })
}

pub fn parse_load(args: &[String]) -> Result<LoadArgs, CommandError> {
    let (flags, positionals) = split_args(args, &["from-config"])?;
    let from_config = flags.contains(&"from-config");

    // Any positional alongside --from-config is a conflict, however many.
    if from_config && !positionals.is_empty() {
        return Err(CommandError::ConflictingArguments);
    }

    match positionals.as_slice() {
        [] if from_config => Ok(LoadArgs {
            from_config,
            path: None,
        }),
        [] => Err(CommandError::Usage(LOAD_USAGE)),
        [path] => Ok(LoadArgs {
            from_config,
            path: Some(path.to_string()),
        }),
        _ => Err(CommandError::TooManyArguments(LOAD_USAGE)),
    }
}
