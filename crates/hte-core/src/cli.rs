use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hte",
    version,
    about = "Delivery-date availability and meal-program day engine",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "hterc")]
    pub hterc: Option<PathBuf>,

    /// Injected current moment; overrides `clock.now`.
    #[arg(long = "now")]
    pub now: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` tokens out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(rest))]
    pub fn parse(rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        let Some((first, args)) = tokens.split_first() else {
            debug!("no explicit command, using default");
            return Ok(Self {
                command: "first-day".to_string(),
                command_args: vec![],
            });
        };

        let known = known_command_names();
        let command = match expand_command_abbrev(first, &known) {
            Some(full) => full.to_string(),
            None => {
                let ambiguous: Vec<&str> = known
                    .iter()
                    .copied()
                    .filter(|name| name.starts_with(first.as_str()))
                    .collect();
                if ambiguous.len() > 1 {
                    warn!(
                        token = %first,
                        candidates = ?ambiguous,
                        "ambiguous command abbreviation"
                    );
                    return Err(anyhow!(
                        "ambiguous command {first}: {}",
                        ambiguous.join(", ")
                    ));
                }
                return Err(anyhow!("unknown command: {first}"));
            }
        };

        debug!(token = %first, expanded = %command, "resolved command token");
        Ok(Self {
            command,
            command_args: args.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::{Invocation, KeyVal, preprocess_args};

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn captures_positional_rc_overrides() {
        let pre = preprocess_args(&os(&[
            "hte",
            "rc.program.duration=7",
            "day",
            "rc.delivery.schedule:every-other-day",
            "next",
        ]))
        .expect("preprocess");
        assert_eq!(pre.cleaned_args, os(&["hte", "day", "next"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.program.duration".to_string(), "7".to_string()),
                ("rc.delivery.schedule".to_string(), "every-other-day".to_string()),
            ]
        );
    }

    #[test]
    fn key_val_requires_equals() {
        let kv: KeyVal = "clock.now = 2025-09-01T10:00".parse().expect("kv");
        assert_eq!(kv.key, "clock.now");
        assert_eq!(kv.value, "2025-09-01T10:00");
        assert!("clock.now".parse::<KeyVal>().is_err());
    }

    #[test]
    fn expands_command_abbreviations() {
        let inv = Invocation::parse(os(&["prog", "2025-09-09"])).expect("parse");
        assert_eq!(inv.command, "program-day");
        assert_eq!(inv.command_args, vec!["2025-09-09".to_string()]);

        let inv = Invocation::parse(vec![]).expect("parse");
        assert_eq!(inv.command, "first-day");

        assert!(Invocation::parse(os(&["d"])).is_err());
        assert!(Invocation::parse(os(&["frobnicate"])).is_err());
    }
}
