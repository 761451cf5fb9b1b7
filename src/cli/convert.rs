use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::json;
use std::path::PathBuf;

use confluence::batch::{run_batch, BatchError, BatchSettings, ConversionFile};
use confluence::chunking::CancellationToken;
use confluence::report::Report;
use confluence::store::StoreMode;

use super::config::Config;
use super::{Folders, Profile};

/// Flags of the convert command.
pub struct ConvertArgs {
    pub file: PathBuf,
    pub folders: Folders,
    pub overwrite: bool,
    pub stub: bool,
    pub profile: Option<Profile>,
    pub config: Option<PathBuf>,
    pub compression_level: Option<u32>,
    pub buffer_bytes: Option<u64>,
}

/// Resolve the profile and batch settings; profile < config file < flags.
fn resolve_settings(args: &ConvertArgs, config: &Config) -> Result<(Profile, BatchSettings)> {
    let conversion = &config.conversion;
    let profile = match args.profile {
        Some(profile) => profile,
        None => conversion.profile()?.unwrap_or_default(),
    };

    let mut option_defaults = profile.run_options();
    conversion.apply(&mut option_defaults);
    if let Some(level) = args.compression_level {
        option_defaults.insert("compression_level".into(), json!(level));
    }
    if let Some(bytes) = args.buffer_bytes {
        option_defaults.insert("buffer_bytes".into(), json!(bytes));
    }
    if args.stub {
        option_defaults.insert("stub_test".into(), json!(true));
    }

    let overwrite = args.overwrite || conversion.overwrite.unwrap_or(false);
    let settings = BatchSettings {
        data_folder: args
            .folders
            .data_folder
            .clone()
            .or_else(|| conversion.data_folder.clone()),
        output_folder: args
            .folders
            .output_folder
            .clone()
            .or_else(|| conversion.output_folder.clone()),
        mode: if overwrite {
            StoreMode::Overwrite
        } else {
            StoreMode::Create
        },
        option_defaults,
    };
    Ok((profile, settings))
}

/// Run every session of a conversion file
pub fn run(args: ConvertArgs) -> Result<()> {
    if !args.file.exists() {
        anyhow::bail!("Conversion file does not exist: {}", args.file.display());
    }
    let config = Config::load(args.config.as_deref())?;
    let file = ConversionFile::from_file(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    let (profile, settings) = resolve_settings(&args, &config)?;
    let stub = settings.option_defaults.get("stub_test") == Some(&json!(true));

    info!("Confluence Converter");
    info!("====================");
    info!("Conversion file: {}", args.file.display());
    info!("Profile: {}", profile);
    info!("Sessions: {}", file.session_count());
    if stub {
        info!("Stub mode: only leading entries of each dataset are written");
    }

    let cancel = CancellationToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current chunk");
        handler.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    match run_batch(&file, &settings, &cancel) {
        Ok(outcomes) => {
            for outcome in &outcomes {
                let report = Report::from_conversion(&outcome.labels, &outcome.report);
                print_report(&report);
                info!(
                    "  {} datasets in {:.2}s",
                    outcome.report.manifest.datasets.len(),
                    outcome.report.elapsed.as_secs_f64()
                );
            }
            info!("Conversion complete: {} sessions", outcomes.len());
            Ok(())
        }
        Err(BatchError::Conversion {
            session,
            completed,
            source,
        }) => {
            let labels: Vec<String> = file.adapters.keys().cloned().collect();
            print_report(&Report::from_failure(&labels, &session, &source));
            if !completed.is_empty() {
                info!("Sessions completed before the failure: {}", completed.join(", "));
            }
            Err(anyhow::Error::new(source).context(format!("Session '{}' failed", session)))
        }
        Err(e) => Err(e).context("Conversion failed"),
    }
}

fn print_report(report: &Report) {
    #[cfg(feature = "colorized_output")]
    {
        println!("{}", report.format_colored());
    }

    #[cfg(not(feature = "colorized_output"))]
    {
        println!("{}", report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confluence::chunking::DEFAULT_BUFFER_BYTES;

    fn args() -> ConvertArgs {
        ConvertArgs {
            file: PathBuf::from("conversion.toml"),
            folders: Folders::default(),
            overwrite: false,
            stub: false,
            profile: None,
            config: None,
            compression_level: None,
            buffer_bytes: None,
        }
    }

    #[test]
    fn test_defaults_without_config() {
        let (profile, settings) = resolve_settings(&args(), &Config::default()).unwrap();
        assert_eq!(profile, Profile::Balanced);
        assert_eq!(settings.mode, StoreMode::Create);
        assert_eq!(settings.option_defaults["compression_level"], json!(4));
        assert_eq!(settings.option_defaults["buffer_bytes"], json!(DEFAULT_BUFFER_BYTES));
    }

    #[test]
    fn test_config_profile_used_when_flag_absent() {
        let config = Config::parse("[conversion]\nprofile = \"fast\"\noverwrite = true\n").unwrap();
        let (profile, settings) = resolve_settings(&args(), &config).unwrap();
        assert_eq!(profile, Profile::Fast);
        assert_eq!(settings.option_defaults["compression_level"], json!(1));
        assert_eq!(settings.mode, StoreMode::Overwrite);

        let mut flagged = args();
        flagged.profile = Some(Profile::MaxCompression);
        let (profile, settings) = resolve_settings(&flagged, &config).unwrap();
        assert_eq!(profile, Profile::MaxCompression);
        assert_eq!(settings.option_defaults["compression_level"], json!(9));
    }

    #[test]
    fn test_flags_over_config_over_profile() {
        let config = Config::parse(
            "[conversion]\nprofile = \"fast\"\ncompression_level = 6\nbuffer_mib = 8\nstub_test = false\n",
        )
        .unwrap();
        let (_, settings) = resolve_settings(&args(), &config).unwrap();
        assert_eq!(settings.option_defaults["compression_level"], json!(6));
        assert_eq!(settings.option_defaults["buffer_bytes"], json!(8 * 1024 * 1024));

        let mut flagged = args();
        flagged.compression_level = Some(2);
        flagged.buffer_bytes = Some(1024);
        flagged.stub = true;
        let (_, settings) = resolve_settings(&flagged, &config).unwrap();
        assert_eq!(settings.option_defaults["compression_level"], json!(2));
        assert_eq!(settings.option_defaults["buffer_bytes"], json!(1024));
        assert_eq!(settings.option_defaults["stub_test"], json!(true));
    }

    #[test]
    fn test_bad_config_profile_is_an_error() {
        let config = Config::parse("[conversion]\nprofile = \"turbo\"\n").unwrap();
        assert!(resolve_settings(&args(), &config).is_err());
    }
}
