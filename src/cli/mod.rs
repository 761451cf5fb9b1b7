use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod config;
mod convert;
mod inspect;
mod profile;
mod schema;
mod validate;

pub use profile::Profile;

/// Confluence - schema-validated conversion of many source formats into one store
#[derive(Parser)]
#[command(name = "confluence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Conversion profile for optimizing speed vs compression.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ProfileArg {
    /// Prioritize speed over compression
    Fast,
    /// Balance between speed and compression
    #[default]
    Balanced,
    /// Maximum compression, slower conversion
    MaxCompression,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Fast => Profile::Fast,
            ProfileArg::Balanced => Profile::Balanced,
            ProfileArg::MaxCompression => Profile::MaxCompression,
        }
    }
}

/// Which composed schema to print.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SchemaArg {
    /// Source locations
    #[default]
    Source,
    /// Metadata, annotated with the extracted values as defaults
    Metadata,
    /// Run options
    Options,
}

/// Where sources are read and stores written.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Folders {
    /// Base folder for relative source paths (default: the conversion file's folder)
    #[arg(long, value_name = "DIR")]
    data_folder: Option<PathBuf>,

    /// Folder receiving output stores (default: the conversion file's folder)
    #[arg(long, value_name = "DIR")]
    output_folder: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every session of a conversion file
    Convert {
        /// Conversion file (TOML)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        folders: Folders,

        /// Replace existing output stores
        #[arg(long)]
        overwrite: bool,

        /// Write only a short leading prefix of every dataset
        #[arg(long)]
        stub: bool,

        /// Conversion profile (fast, balanced, max-compression; default: config file, then balanced)
        #[arg(short = 'p', long, value_enum)]
        profile: Option<ProfileArg>,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        // === Advanced tuning flags (hidden from --help) ===
        /// Gzip level (0-9, default: profile-dependent)
        #[arg(short = 'c', long, hide = true)]
        compression_level: Option<u32>,

        /// Streaming buffer budget in bytes
        #[arg(short = 'b', long, hide = true)]
        buffer_bytes: Option<u64>,
    },

    /// Dry-run validation of every session of a conversion file
    Validate {
        /// Conversion file (TOML)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        folders: Folders,
    },

    /// Print a composed schema of a conversion file as JSON
    Schema {
        /// Conversion file (TOML)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Schema to print
        #[arg(short, long, default_value = "source", value_enum)]
        kind: SchemaArg,

        /// Session whose adapters are opened for metadata/options (`<experiment>/<n>`, default: first)
        #[arg(long)]
        session: Option<String>,

        #[command(flatten)]
        folders: Folders,
    },

    /// Display the manifest, metadata and datasets of an output store
    Inspect {
        /// Store directory
        #[arg(value_name = "STORE")]
        store: PathBuf,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Convert {
            file,
            folders,
            overwrite,
            stub,
            profile,
            config,
            compression_level,
            buffer_bytes,
        } => convert::run(convert::ConvertArgs {
            file,
            folders,
            overwrite,
            stub,
            profile: profile.map(Profile::from),
            config,
            compression_level,
            buffer_bytes,
        }),
        Commands::Validate { file, folders } => validate::run(file, folders),
        Commands::Schema {
            file,
            kind,
            session,
            folders,
        } => schema::run(file, kind, session, folders),
        Commands::Inspect { store } => inspect::run(store),
    }
}
