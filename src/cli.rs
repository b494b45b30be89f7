//! Command-line interface for streamgate
//!
//! Provides argument parsing using clap derive macros.

use crate::message::MessageKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Client-facing message exchange for a streaming media engine
#[derive(Parser, Debug)]
#[command(
    name = "streamgate",
    version,
    about = "Client-facing message exchange for a streaming media engine"
)]
pub struct Cli {
    /// Engine configuration file (TOML)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Override a configuration value (e.g. -x engine.input_capacity=64)
    #[arg(short = 'x', long = "set", value_name = "KEY=VALUE", global = true)]
    pub overrides: Vec<String>,

    /// Suppress engine output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug logging)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the engine with no endpoints and shut it down again
    Check,

    /// Push one sample message per kind through the engine and compare
    Selftest {
        /// Message kinds to exercise (default: every kind)
        #[arg(long, value_name = "KINDS", value_delimiter = ',', value_parser = parse_kind)]
        kinds: Vec<MessageKind>,
    },

    /// Stream WAV files through the engine and print the results
    Transcribe {
        /// 16-bit PCM WAV files, streamed one after another
        #[arg(value_name = "WAV", required = true)]
        wavs: Vec<PathBuf>,

        /// Frames per pushed chunk
        #[arg(long, value_name = "FRAMES", default_value_t = crate::defaults::CHUNK_FRAMES)]
        chunk_frames: usize,

        /// Also print tentative results
        #[arg(long)]
        tentative: bool,
    },
}

fn parse_kind(s: &str) -> Result<MessageKind, String> {
    s.trim().parse().map_err(|e| format!("{}", e))
}

impl Commands {
    /// Kinds for `selftest`, falling back to every kind.
    pub fn selftest_kinds(kinds: &[MessageKind]) -> Vec<MessageKind> {
        if kinds.is_empty() {
            MessageKind::ALL.to_vec()
        } else {
            kinds.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["streamgate", "engine.toml", "check"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("engine.toml"));
        assert!(matches!(cli.command, Commands::Check));
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_overrides_and_flags() {
        let cli = Cli::try_parse_from([
            "streamgate",
            "-q",
            "-vv",
            "-x",
            "engine.input_capacity=8",
            "--set",
            "routes.dec_output=raw_audio",
            "engine.toml",
            "check",
        ])
        .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.overrides,
            vec!["engine.input_capacity=8", "routes.dec_output=raw_audio"]
        );
    }

    #[test]
    fn test_parse_selftest_kinds() {
        let cli = Cli::try_parse_from([
            "streamgate",
            "engine.toml",
            "selftest",
            "--kinds",
            "binary,conversation_state",
        ])
        .unwrap();
        let Commands::Selftest { kinds } = cli.command else {
            panic!("expected selftest");
        };
        assert_eq!(
            kinds,
            vec![MessageKind::Binary, MessageKind::ConversationState]
        );
    }

    #[test]
    fn test_selftest_accepts_json() {
        let cli = Cli::try_parse_from(["streamgate", "engine.toml", "selftest", "--kinds", "json"])
            .unwrap();
        let Commands::Selftest { kinds } = cli.command else {
            panic!("expected selftest");
        };
        assert_eq!(kinds, vec![MessageKind::Json]);
    }

    #[test]
    fn test_selftest_rejects_unknown_kind() {
        let result =
            Cli::try_parse_from(["streamgate", "engine.toml", "selftest", "--kinds", "video"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_selftest_default_kinds() {
        let kinds = Commands::selftest_kinds(&[]);
        assert_eq!(kinds, MessageKind::ALL.to_vec());
        assert_eq!(
            Commands::selftest_kinds(&[MessageKind::Audio]),
            vec![MessageKind::Audio]
        );
    }

    #[test]
    fn test_parse_transcribe() {
        let cli = Cli::try_parse_from([
            "streamgate",
            "engine.toml",
            "transcribe",
            "a.wav",
            "b.wav",
            "--chunk-frames",
            "800",
            "--tentative",
        ])
        .unwrap();
        let Commands::Transcribe {
            wavs,
            chunk_frames,
            tentative,
        } = cli.command
        else {
            panic!("expected transcribe");
        };
        assert_eq!(wavs, vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")]);
        assert_eq!(chunk_frames, 800);
        assert!(tentative);
    }

    #[test]
    fn test_transcribe_requires_files() {
        assert!(Cli::try_parse_from(["streamgate", "engine.toml", "transcribe"]).is_err());
    }
}
