// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]
// Add other lints specific to this module that you want to allow but not auto-fix

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, debug, info};
use std::io::Write;
use std::path::{Path, PathBuf};

use lektor::app_config::{self, Config};
use lektor::errors::AppError;
use lektor::preparation::{
    PreparationResult, format_preparation_summary, load_preparation_result, translation_context,
};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the summary of a saved preparation analysis
    Summary {
        /// Preparation analysis JSON file
        #[arg(value_name = "ANALYSIS_JSON")]
        path: PathBuf,
    },

    /// Print the translation context injected for a chapter
    Context {
        /// Preparation analysis JSON file
        #[arg(value_name = "ANALYSIS_JSON")]
        path: PathBuf,

        /// Chapter number (1-based); 0 prints the book-wide context only
        #[arg(long, default_value_t = 0)]
        chapter: usize,
    },

    /// Load (or create) the configuration file and validate it
    CheckConfig {
        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config_path: PathBuf,
    },

    /// Generate shell completions for lektor
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Lektor - multi-pass preparation for literary machine translation
///
/// Inspects the analyses produced by the preparation phase and the
/// configuration that drives it.
#[derive(Parser, Debug)]
#[command(name = "lektor")]
#[command(version)]
#[command(about = "Multi-pass content preparation for literary translation")]
#[command(long_about = "Lektor analyses a book in several passes before translating it and
conditions every translation request on the consolidated analysis.

EXAMPLES:
    lektor summary analysis.json                 # Print a preparation summary
    lektor context analysis.json --chapter 3     # Context injected for chapter 3
    lektor check-config -c conf.json             # Validate (or create) a config
    lektor completions bash > lektor.bash        # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the config file doesn't
    exist, a default one will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color sequence for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info by default; the command line or config may change it later
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();
    if let Some(level) = &cli.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    match cli.command {
        Commands::Summary { path } => {
            let result = load_result(&path)?;
            print!("{}", format_preparation_summary(&result));
        }
        Commands::Context { path, chapter } => {
            let result = load_result(&path)?;
            print!("{}", translation_context(&result.final_analysis, chapter));
        }
        Commands::CheckConfig { config_path } => {
            check_config(&config_path, cli.log_level.is_some())?;
        }
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "lektor", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn load_result(path: &Path) -> Result<PreparationResult, AppError> {
    debug!("Loading preparation analysis from {}", path.display());
    Ok(load_preparation_result(path)?)
}

fn check_config(path: &Path, log_level_overridden: bool) -> Result<()> {
    let config = Config::load_or_create(path)?;

    // Config log level applies unless the command line set one
    if !log_level_overridden {
        log::set_max_level(config.log_level.to_level_filter());
    }

    config.validate().context("Configuration validation failed")?;
    info!("Configuration at '{}' is valid", path.display());

    let preparation = config.preparation_config();
    let json = serde_json::to_string_pretty(&preparation)
        .context("Failed to serialize preparation config")?;
    println!("{}", json);
    if !config.preparation.enabled {
        println!("(preparation disabled)");
    }
    Ok(())
}
