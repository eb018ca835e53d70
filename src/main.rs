use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tunevault::config::{AppConfig, CliConfig, FileConfig};
use tunevault::{LibraryStore, LoftyTagCodec, NullTagCodec, TagCodec};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the library database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory holding song content files. Defaults to `<db-dir>/songs`.
    #[clap(long, value_parser = parse_path)]
    pub content_dir: Option<PathBuf>,

    /// Path to a TOML config file. Its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Number of read-only connections. 0 reads through the write connection.
    #[clap(long)]
    pub read_pool_size: Option<usize>,

    /// How long a connection waits on a locked database, in milliseconds.
    #[clap(long)]
    pub busy_timeout_ms: Option<u64>,

    /// Store content as uploaded, never rewriting embedded tags.
    #[clap(long)]
    pub no_write_tags: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates or migrates the library, then exits.
    Init,

    /// Imports audio files, reading their metadata from embedded tags.
    Import {
        #[clap(value_parser = parse_path, required = true)]
        files: Vec<PathBuf>,

        /// Album the previous upload landed in, used to disambiguate
        /// albums sharing a name.
        #[clap(long)]
        last_album_id: Option<String>,
    },

    /// Prints the library delta since a watermark as JSON.
    SyncReport {
        #[clap(long, default_value_t = 0)]
        from_ts: i64,
    },

    /// Prints the file sync delta of one user since a watermark as JSON.
    FileSyncReport {
        /// Name of the user.
        #[clap(long)]
        user: String,

        #[clap(long, default_value_t = 0)]
        from_ts: i64,
    },
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        content_dir: cli_args.content_dir.clone(),
        read_pool_size: cli_args.read_pool_size,
        busy_timeout_ms: cli_args.busy_timeout_ms,
        no_write_tags: cli_args.no_write_tags,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let tag_codec: Arc<dyn TagCodec> = if config.write_tags {
        Arc::new(LoftyTagCodec)
    } else {
        info!("Tag writing disabled");
        Arc::new(NullTagCodec)
    };

    info!(
        "Opening library database at {:?}...",
        config.library_db_path()
    );
    let store = LibraryStore::open(
        config.library_db_path(),
        &config.content_dir,
        tag_codec,
        &config.store_options(),
    )?;

    match cli_args.command {
        Command::Init => {
            info!("Library ready at {:?}", config.db_dir);
        }
        Command::Import {
            files,
            last_album_id,
        } => {
            let mut last_album_id = last_album_id;
            for path in files {
                let content =
                    std::fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;
                let song = store
                    .create_song_from_raw_content(&content, last_album_id.as_deref())
                    .with_context(|| format!("Failed to import {:?}", path))?;
                println!("{}", serde_json::to_string(&song)?);
                if song.album_id.is_some() {
                    last_album_id = song.album_id;
                }
            }
        }
        Command::SyncReport { from_ts } => {
            let report = store.read_sync_report(from_ts)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::FileSyncReport { user, from_ts } => {
            let user = store.read_user_by_name(&user)?;
            let report = store.read_file_sync_report(from_ts, &user.id)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
