use anyhow::{Context, Result};
use std::path::PathBuf;

use confluence::batch::{BatchSettings, ConversionFile};

use super::{Folders, SchemaArg};

/// Print a composed schema of a conversion file as JSON
pub fn run(file: PathBuf, kind: SchemaArg, session: Option<String>, folders: Folders) -> Result<()> {
    let conversion = ConversionFile::from_file(&file)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    let schema = if kind == SchemaArg::Source {
        conversion.source_schema()?
    } else {
        let settings = BatchSettings {
            data_folder: folders.data_folder,
            output_folder: folders.output_folder,
            ..Default::default()
        };
        let plans = conversion.plan(&settings)?;
        let plan = match &session {
            Some(name) => plans.iter().find(|p| &p.name == name),
            None => plans.first(),
        }
        .with_context(|| match &session {
            Some(name) => format!("No session named '{}'", name),
            None => "The conversion file defines no sessions".to_string(),
        })?;

        let mut orchestrator = plan.open(&conversion.kinds()?)?;
        match kind {
            SchemaArg::Metadata => orchestrator.metadata_schema_with_defaults()?,
            _ => orchestrator.compose_schemas()?.options.clone(),
        }
    };

    println!("{}", schema.to_json_pretty()?);
    Ok(())
}
