use anyhow::{Context, Result};
use std::path::PathBuf;

use confluence::store::{DatasetKind, StoreReader};

/// Display the manifest, metadata and datasets of an output store
pub fn run(store: PathBuf) -> Result<()> {
    if !store.exists() {
        anyhow::bail!("Store does not exist: {}", store.display());
    }
    let reader = StoreReader::open(&store).context("Failed to open store")?;
    let manifest = reader.manifest();

    println!("Confluence Store Information");
    println!("============================");
    println!("Store: {}", store.display());
    println!("Format version: {}", manifest.format_version);
    println!("Created: {}", manifest.created);
    println!("Generator: {}", manifest.generator);
    println!("Finished: {}", if manifest.finished { "yes" } else { "no" });
    println!();

    println!("Datasets:");
    for entry in reader.datasets() {
        match entry.kind {
            DatasetKind::Array => {
                let meta = reader.array_meta(&entry.path)?;
                println!(
                    "  {} (array {} {:?}, chunks {:?}, {}{})",
                    entry.path,
                    meta.element_type,
                    meta.shape,
                    meta.chunk_shape,
                    meta.codec.as_str(),
                    if meta.complete { "" } else { ", INCOMPLETE" }
                );
            }
            DatasetKind::Table => {
                let rows: usize = reader
                    .read_table(&entry.path)?
                    .iter()
                    .map(|batch| batch.num_rows())
                    .sum();
                println!("  {} (table, {} rows)", entry.path, rows);
            }
        }
    }
    println!();

    println!("Metadata:");
    let metadata = reader.metadata()?;
    println!("{}", metadata.to_json_pretty()?);
    Ok(())
}
