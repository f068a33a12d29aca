mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::{Parser, Subcommand};
use intersync::{CancelToken, ExportOptions, Settings};
use log::{info, warn};

use commands::import::ImportArgs;
use commands::EXIT_FAILURE;
use logging::LogFormat;

#[derive(Debug, Parser)]
#[command(
    name = "intersync",
    version,
    about = "Keep a tree of YAML object definitions in sync with the remote API"
)]
struct Cli {
    /// Directory holding the object tree (overrides FILES_DIR).
    #[arg(long, global = true)]
    files_dir: Option<PathBuf>,

    /// Log filter directive, e.g. `info` or `intersync=debug` (overrides LOG_LEVEL).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, default_value_t = false, global = true)]
    debug: bool,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Print the result as JSON on stdout.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write remote objects into the files directory.
    Export {
        /// Limit to these object types (canonical name, folder or short key).
        #[arg(long, value_delimiter = ',')]
        object_types: Vec<String>,
        /// Remove files of exported types that match no remote object.
        #[arg(long, default_value_t = false)]
        prune: bool,
    },
    /// Bring the remote side in line with the files directory.
    Import {
        /// Limit to these object types (canonical name, folder or short key).
        #[arg(long, value_delimiter = ',')]
        object_types: Vec<String>,
        /// Never delete remote objects.
        #[arg(long, overrides_with = "no_safe_mode")]
        safe_mode: bool,
        /// Allow deletions even if SAFE_MODE is set.
        #[arg(long, overrides_with = "safe_mode")]
        no_safe_mode: bool,
        /// Plan and validate without changing anything remotely.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Maximum concurrent API calls (overrides MAX_WORKERS).
        #[arg(long)]
        workers: Option<usize>,
        /// Stop starting new operations after this many seconds (overrides RUN_TIMEOUT_SECS).
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Check the files directory without contacting the remote API.
    Validate {
        /// Limit to these object types (canonical name, folder or short key).
        #[arg(long, value_delimiter = ',')]
        object_types: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    if let Some(dir) = cli.files_dir {
        settings.files_dir = dir;
    }
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    settings.debug |= cli.debug;

    if let Err(e) = logging::init(settings.effective_log_level(), cli.log_format) {
        eprintln!("error: {e}");
        return ExitCode::from(EXIT_FAILURE);
    }
    info!("Starting intersync v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancelToken::new();
    let interrupted = cancel.flag();
    if let Err(e) = ctrlc::set_handler(move || {
        if !interrupted.swap(true, Ordering::AcqRel) {
            eprintln!("Interrupted; finishing operations in flight");
        }
    }) {
        warn!("Could not install interrupt handler: {}", e);
    }

    let result = match cli.command {
        Commands::Export {
            object_types,
            prune,
        } => commands::export::run(
            &settings,
            ExportOptions {
                object_types,
                prune,
            },
            cli.json,
        ),
        Commands::Import {
            object_types,
            safe_mode,
            no_safe_mode,
            dry_run,
            workers,
            timeout,
        } => commands::import::run(
            &settings,
            ImportArgs {
                object_types,
                safe_mode: match (safe_mode, no_safe_mode) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                dry_run,
                workers,
                timeout_secs: timeout,
            },
            cancel,
            cli.json,
        ),
        Commands::Validate { object_types } => {
            commands::validate::run(&settings, object_types, cancel, cli.json)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
