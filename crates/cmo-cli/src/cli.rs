//! Startup arguments of the `unvirt` shell.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "unvirt",
    version,
    about = "Inspect and re-save Virtools composition files",
    long_about = "Interactive inspector for Virtools composition files (.cmo, .nmo, .vmo).\n\n\
                  Commands are read from stdin, one per line. Type 'help' at the prompt\n\
                  for the command list and 'exit' to quit."
)]
pub struct Cli {
    /// File loaded before the first prompt.
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Load FILE deeply, creating live objects.
    #[arg(long = "deep", requires = "file")]
    pub deep: bool,

    /// Encodings used for names, tried in order (comma separated).
    #[arg(long = "encoding", value_name = "NAMES", value_delimiter = ',')]
    pub encoding: Vec<String>,

    /// Folder receiving extracted included files.
    #[arg(long = "temp", value_name = "DIR")]
    pub temp: Option<PathBuf>,

    /// Extra folders searched for external resources.
    #[arg(long = "rsc", value_name = "DIR")]
    pub rsc: Vec<PathBuf>,

    /// Entries per listed page.
    #[arg(long = "items", value_name = "COUNT", default_value = "10")]
    pub items: NonZeroUsize,

    /// Columns shown by list commands.
    #[arg(long = "style", value_enum, default_value = "simple")]
    pub style: StyleArg,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(long = "log-format", value_enum, default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StyleArg {
    Full,
    Simple,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_startup_values() {
        let cli = Cli::try_parse_from([
            "unvirt",
            "--encoding",
            "utf-8,gbk",
            "--items",
            "25",
            "--style",
            "full",
            "--deep",
            "level.nmo",
        ])
        .unwrap();
        assert_eq!(cli.encoding, ["utf-8", "gbk"]);
        assert_eq!(cli.items.get(), 25);
        assert!(matches!(cli.style, StyleArg::Full));
        assert!(cli.deep);
        assert_eq!(cli.file, Some(PathBuf::from("level.nmo")));
    }

    #[test]
    fn test_deep_requires_file() {
        assert!(Cli::try_parse_from(["unvirt", "--deep"]).is_err());
        assert!(Cli::try_parse_from(["unvirt", "--items", "0"]).is_err());
    }
}
