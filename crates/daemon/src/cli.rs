use std::{path::PathBuf, str::FromStr};

use clap::{ArgAction, Args, Parser, Subcommand};
use strum_macros::EnumString;

#[derive(Parser)]
#[command(name = "keel-node", about = "Run a keel node")]
#[command(version, propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the node
    ///
    /// usage example: keel-node start -c node.json -g genesis.json
    Start(StartArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Node config file
    #[arg(short = 'c', long)]
    pub config: PathBuf,

    /// Genesis config file
    #[arg(short = 'g', long)]
    pub genesis: PathBuf,

    /// Miner start or not, [start, stop]
    #[arg(short = 'm', long, default_value = "start")]
    pub miner: String,

    /// Push node metrics to the configured sink
    #[arg(
        short = 's',
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub metrics: bool,
}

/// What to do with the miner once the node is up. Only a case-insensitive
/// `start` starts it; every other value leaves it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum MinerMode {
    #[strum(serialize = "start")]
    Start,
    #[strum(disabled)]
    Inactive,
}

impl MinerMode {
    pub fn parse(raw: &str) -> Self {
        Self::from_str(raw).unwrap_or(Self::Inactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_args(argv: &[&str]) -> StartArgs {
        let mut full = vec!["keel-node", "start"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).expect("arguments parse").command {
            Commands::Start(args) => args,
        }
    }

    #[test]
    fn defaults_start_the_miner_without_metrics() {
        let args = start_args(&["-c", "node.json", "-g", "genesis.json"]);
        assert_eq!(args.config, PathBuf::from("node.json"));
        assert_eq!(args.genesis, PathBuf::from("genesis.json"));
        assert_eq!(args.miner, "start");
        assert!(!args.metrics);
    }

    #[test]
    fn metrics_accepts_bare_and_explicit_values() {
        assert!(start_args(&["-c", "n", "-g", "g", "-s"]).metrics);
        assert!(start_args(&["-c", "n", "-g", "g", "--metrics=true"]).metrics);
        assert!(!start_args(&["-c", "n", "-g", "g", "--metrics=false"]).metrics);
    }

    #[test]
    fn config_and_genesis_are_required() {
        assert!(Cli::try_parse_from(["keel-node", "start", "-g", "g"]).is_err());
        assert!(Cli::try_parse_from(["keel-node", "start", "-c", "n"]).is_err());
    }

    #[test]
    fn miner_mode_is_case_insensitive() {
        for raw in ["start", "Start", "START"] {
            assert_eq!(MinerMode::parse(raw), MinerMode::Start);
        }
        for raw in ["stop", "", "inactive", " start"] {
            assert_eq!(MinerMode::parse(raw), MinerMode::Inactive);
        }
    }
}
