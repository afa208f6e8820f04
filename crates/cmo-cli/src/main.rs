//! Unvirt, the composition file shell.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context as _, Result};
use clap::{ColorChoice, Parser};
use cmo_cli::format::ListStyle;
use cmo_cli::logging::{LogConfig, LogFormat, init_logging};
use cmo_cli::shell::{Flow, Shell};
use cmo_format::ContextOptions;
use tracing::level_filters::LevelFilter;

mod cli;

use crate::cli::{Cli, LogFormatArg, LogLevelArg, StyleArg};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
    }
    // Errors inside the session are printed by the shell; the exit status
    // stays 0 either way.
    if let Err(error) = run(&cli) {
        eprintln!("error: {error:#}");
    }
}

fn run(cli: &Cli) -> Result<()> {
    let options = ContextOptions {
        encodings: cli.encoding.clone(),
        temp_folder: cli.temp.clone(),
        extra_paths: cli.rsc.clone(),
        ..ContextOptions::default()
    };
    let style = ListStyle {
        page_len: cli.items.get(),
        full: matches!(cli.style, StyleArg::Full),
        styled: match cli.color.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        },
    };

    let stdout = io::stdout();
    let mut shell =
        Shell::new(&options, style, stdout.lock()).context("failed to set up the context")?;
    writeln!(
        shell.output_mut(),
        "Unvirt\nType 'help' for more information. Type 'exit' to quit."
    )?;
    if let Some(file) = &cli.file {
        shell.load_path(file, cli.deep)?;
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        write!(shell.output_mut(), "> ")?;
        shell.output_mut().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if shell.execute_line(line.trim_end_matches(['\r', '\n']))? == Flow::Exit {
            break;
        }
    }
    Ok(())
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
