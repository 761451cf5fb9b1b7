//! # Confluence Converter
//!
//! Command-line front end for running conversion files.
//!
//! ## Usage
//!
//! ```bash
//! # Check every session without writing anything
//! confluence validate conversion.toml
//!
//! # Convert, writing stores next to the conversion file
//! confluence convert conversion.toml --profile fast
//!
//! # Quick trial run with truncated datasets
//! confluence convert conversion.toml --stub --output-folder /tmp/trial
//!
//! # Print the composed metadata schema of the first session
//! confluence schema conversion.toml --kind metadata
//!
//! # Look inside a finished store
//! confluence inspect mouse1_day1.confluence
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

use cli::{dispatch, init_logging, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity());
    dispatch(cli)
}
