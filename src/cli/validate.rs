use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use confluence::batch::{check_batch, BatchSettings, ConversionFile};

use super::Folders;

/// Dry-run validation of every session of a conversion file
pub fn run(file: PathBuf, folders: Folders) -> Result<()> {
    info!("Confluence Validator");
    info!("====================");
    info!("File: {}", file.display());

    let conversion = ConversionFile::from_file(&file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let settings = BatchSettings {
        data_folder: folders.data_folder,
        output_folder: folders.output_folder,
        ..Default::default()
    };

    let report = check_batch(&conversion, &settings);

    #[cfg(feature = "colorized_output")]
    {
        println!("{}", report.format_colored());
    }

    #[cfg(not(feature = "colorized_output"))]
    {
        println!("{}", report);
    }

    // Exit with error code if validation failed
    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
