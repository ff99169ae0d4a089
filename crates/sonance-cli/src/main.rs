use anyhow::Result;
use clap::Parser;
use sonance_etl::Config;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "sonance", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the fingerprint store (default: ~/.local/share/sonance/sonance.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Fingerprint audio files and add them to the store
    ///
    /// Accepts a single file or a directory, which is walked recursively.
    /// Every WAV, AIFF/AIFC, MP3 and Ogg Vorbis file found is decoded,
    /// down-mixed to mono, resampled and split into overlapping spectral
    /// images. Each image is hashed into one sub-fingerprint.
    ///
    /// Embedded tags (title, artist, album, ISRC, year) describe the stored
    /// track; files without a title tag are named after the file stem.
    ///
    /// Files are processed concurrently, up to `pool.max_size` at a time.
    /// A file that fails to decode, or is too short to produce a single
    /// fingerprint, is reported and skipped; nothing is stored for it.
    Ingest {
        /// Audio file or directory of audio files
        path: PathBuf,
    },
    /// Find stored tracks that sound like a clip
    Query {
        /// Audio clip to search for
        path: PathBuf,

        /// Number of results to show
        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,

        /// Override the configured vote threshold
        #[arg(short, long)]
        threshold: Option<u32>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show store statistics
    Status {
        /// Only list tracks whose title matches
        filter: Option<String>,
    },
    /// Remove a track and its sub-fingerprints
    Delete {
        /// Track id, or an exact title
        track: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Print one setting, or the whole config file
    Get {
        /// Setting name, e.g. `threshold_votes` or `hashing.tables`
        key: Option<String>,
    },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Write the example config file if none exists
    Init,
}

/// Resolve configuration (CLI > ENV > file > defaults) and make sure the
/// store's directory exists.
fn load_config(db: Option<PathBuf>) -> Result<Config> {
    let config = match db {
        Some(db_path) => Config::load_with_db_path(db_path)?,
        None => Config::load()?,
    };

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Ingest { path } => {
            let config = load_config(cli.db)?;
            commands::run_ingest(&config, path).await?;
        }
        Commands::Query {
            path,
            top_k,
            threshold,
            json,
        } => {
            let config = load_config(cli.db)?;
            commands::run_query(&config, &path, top_k, threshold, json)?;
        }
        Commands::Status { filter } => {
            let config = load_config(cli.db)?;
            commands::show_status(&config, filter)?;
        }
        Commands::Delete { track } => {
            let config = load_config(cli.db)?;
            commands::run_delete(&config, &track)?;
        }
        Commands::Config { command } => match command {
            ConfigCommand::Show => commands::config::show_config()?,
            ConfigCommand::Get { key } => commands::config::get_config(key)?,
            ConfigCommand::Path => commands::config::show_path()?,
            ConfigCommand::Example => commands::config::show_example()?,
            ConfigCommand::Init => commands::config::init_config()?,
        },
    }

    Ok(())
}
