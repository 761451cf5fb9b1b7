//! # Batch Module
//!
//! Runs the conversions described by a TOML *conversion file*:
//!
//! ```toml
//! [adapters]
//! Recording = "binary-recording"
//! Trials = "csv-time-intervals"
//!
//! [metadata.File]
//! lab = "Systems Neuroscience"
//!
//! [conversion_options]
//! compression_level = 6
//!
//! [experiments.ymaze.metadata.File]
//! experiment_description = "Y-maze alternation"
//!
//! [[experiments.ymaze.sessions]]
//! output_name = "mouse1_day1"
//! source_data.Recording.file_path = "mouse1/day1.imec0.ap.bin"
//! source_data.Trials.file_path = "mouse1/day1_trials.csv"
//! conversion_options.Trials.tag = "trials"
//! metadata.File.session_id = "day1"
//! ```
//!
//! Relative `*_path` / `*_paths` source entries resolve against the data
//! folder (default: the conversion file's folder). Every session's source
//! data is validated against the composed source schema of `[adapters]`
//! before any adapter is opened.
//!
//! Metadata precedence, lowest first: adapters, `[metadata]`, the
//! experiment's metadata, the session's metadata. Option precedence: config
//! defaults, `[conversion_options]` (applied to every adapter), the session's
//! options for that label.
//!
//! Sessions run one after another; the first failure stops the batch.

mod error;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::adapter::Converter;
use crate::chunking::CancellationToken;
use crate::formats::AdapterKind;
use crate::metadata::{deep_merge, toml_table_to_json, MetadataTree};
use crate::orchestrator::{ConversionReport, Orchestrator};
use crate::report::{Check, Report};
use crate::schema::{compose_source_schema, validate, Schema};
use crate::store::{StoreMode, STORE_EXTENSION};

pub use error::BatchError;

/// Parsed conversion file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionFile {
    /// Label to adapter kind name, in registration order
    pub adapters: IndexMap<String, String>,
    /// Metadata applied to every session
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Run options applied to every adapter of every session
    #[serde(default)]
    pub conversion_options: Map<String, Value>,
    /// Experiments by name
    #[serde(default)]
    pub experiments: IndexMap<String, Experiment>,
    #[serde(skip)]
    base_dir: PathBuf,
}

/// A group of sessions sharing metadata
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Experiment {
    /// Metadata applied to every session of the experiment
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Sessions, in run order
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// One conversion producing one output store
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Session {
    /// Source locations keyed by adapter label
    pub source_data: Map<String, Value>,
    /// Session metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Run options keyed by adapter label
    #[serde(default)]
    pub conversion_options: Map<String, Value>,
    /// Store name without extension
    #[serde(default)]
    pub output_name: Option<String>,
}

/// Where and how a batch runs
#[derive(Debug, Clone, Default)]
pub struct BatchSettings {
    /// Base for relative source paths (default: the conversion file's folder)
    pub data_folder: Option<PathBuf>,
    /// Folder receiving the stores (default: the conversion file's folder)
    pub output_folder: Option<PathBuf>,
    /// Whether existing stores may be replaced
    pub mode: StoreMode,
    /// Lowest-precedence run options, applied to every adapter
    pub option_defaults: Map<String, Value>,
}

/// A session with paths resolved, trees merged and source data validated
#[derive(Debug, Clone)]
pub struct SessionPlan {
    /// `<experiment>/<1-based index>`
    pub name: String,
    /// Store directory
    pub output: PathBuf,
    /// Labels with source data, in registration order
    pub labels: Vec<String>,
    /// Resolved source data keyed by label
    pub source: Map<String, Value>,
    /// Global, experiment and session metadata merged
    pub metadata: MetadataTree,
    /// Run options keyed by label
    pub options: Map<String, Value>,
}

/// A completed session
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// `<experiment>/<1-based index>`
    pub session: String,
    /// Labels that ran, in order
    pub labels: Vec<String>,
    /// Orchestrator outcome
    pub report: ConversionReport,
}

impl ConversionFile {
    /// Parse a conversion file; relative paths will resolve against `base_dir`.
    pub fn from_toml_str(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self, BatchError> {
        let table: toml::Table = toml::from_str(text)?;
        let mut file: ConversionFile = serde_json::from_value(Value::Object(toml_table_to_json(table)))?;
        file.base_dir = base_dir.into();
        Ok(file)
    }

    /// Load a conversion file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_toml_str(&text, base_dir)
    }

    /// Folder the file was loaded from.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Total number of sessions across experiments.
    pub fn session_count(&self) -> usize {
        self.experiments.values().map(|e| e.sessions.len()).sum()
    }

    /// Resolve every `[adapters]` kind name.
    pub fn kinds(&self) -> Result<IndexMap<String, AdapterKind>, BatchError> {
        self.adapters
            .iter()
            .map(|(label, name)| {
                let kind = name.parse().map_err(|source| BatchError::UnknownKind {
                    label: label.clone(),
                    source,
                })?;
                Ok((label.clone(), kind))
            })
            .collect()
    }

    /// Source schema composed from the kinds of `[adapters]`.
    pub fn source_schema(&self) -> Result<Schema, BatchError> {
        let kinds = self.kinds()?;
        Ok(compose_source_schema(
            kinds.iter().map(|(label, kind)| (label.as_str(), kind.source_schema())),
        ))
    }

    fn plan_session(
        &self,
        experiment: &str,
        exp: &Experiment,
        index: usize,
        settings: &BatchSettings,
    ) -> Result<SessionPlan, BatchError> {
        let name = format!("{experiment}/{}", index + 1);
        let session = &exp.sessions[index];

        let data_folder = settings.data_folder.as_deref().unwrap_or(&self.base_dir);
        let source = resolve_source_paths(&session.source_data, data_folder);
        validate(&Value::Object(source.clone()), &self.source_schema()?).map_err(|violation| {
            BatchError::InvalidSource {
                session: name.clone(),
                violation,
            }
        })?;

        let labels: Vec<String> = self
            .adapters
            .keys()
            .filter(|label| source.contains_key(*label))
            .cloned()
            .collect();

        let mut metadata = MetadataTree::from(self.metadata.clone());
        metadata.merge(&MetadataTree::from(exp.metadata.clone()), "experiment metadata");
        metadata.merge(&MetadataTree::from(session.metadata.clone()), "session metadata");

        let mut options = Map::new();
        for label in &labels {
            let mut merged = settings.option_defaults.clone();
            deep_merge(&mut merged, &self.conversion_options, "global conversion options");
            if let Some(Value::Object(own)) = session.conversion_options.get(label) {
                deep_merge(&mut merged, own, "session conversion options");
            }
            options.insert(label.clone(), Value::Object(merged));
        }
        // Left in place so option validation reports them.
        for (key, value) in &session.conversion_options {
            if !labels.contains(key) {
                options.insert(key.clone(), value.clone());
            }
        }

        let output_folder = settings.output_folder.as_deref().unwrap_or(&self.base_dir);
        let stem = match &session.output_name {
            Some(stem) => stem
                .strip_suffix(&format!(".{STORE_EXTENSION}"))
                .unwrap_or(stem)
                .to_string(),
            None => format!("{experiment}_session{}", index + 1),
        };

        Ok(SessionPlan {
            name,
            output: output_folder.join(format!("{stem}.{STORE_EXTENSION}")),
            labels,
            source,
            metadata,
            options,
        })
    }

    /// Plan every session, in file order. Fails on the first invalid one.
    pub fn plan(&self, settings: &BatchSettings) -> Result<Vec<SessionPlan>, BatchError> {
        let mut plans = Vec::with_capacity(self.session_count());
        for (experiment, exp) in &self.experiments {
            for index in 0..exp.sessions.len() {
                plans.push(self.plan_session(experiment, exp, index, settings)?);
            }
        }
        Ok(plans)
    }
}

impl SessionPlan {
    /// Open this session's adapters and compose their schemas.
    pub fn open(&self, kinds: &IndexMap<String, AdapterKind>) -> Result<Orchestrator, BatchError> {
        let mut converter = Converter::new();
        for label in &self.labels {
            let open_error = |source| BatchError::Open {
                session: self.name.clone(),
                label: label.clone(),
                source,
            };
            let kind = kinds.get(label).copied().ok_or_else(|| {
                open_error(crate::adapter::AdapterError::UnknownKind(label.clone()))
            })?;
            let source = self.source.get(label).cloned().unwrap_or(Value::Null);
            let adapter = kind.open(&source).map_err(open_error)?;
            converter.add(label.clone(), adapter).map_err(open_error)?;
        }

        let mut orchestrator = Orchestrator::new(converter);
        orchestrator
            .compose_schemas()
            .map_err(|source| BatchError::Conversion {
                session: self.name.clone(),
                completed: Vec::new(),
                source,
            })?;
        Ok(orchestrator)
    }
}

/// Resolve relative `*_path` strings and `*_paths` string lists against `base`.
pub fn resolve_source_paths(source: &Map<String, Value>, base: &Path) -> Map<String, Value> {
    source
        .iter()
        .map(|(label, entry)| {
            let entry = match entry {
                Value::Object(fields) => Value::Object(
                    fields
                        .iter()
                        .map(|(key, value)| (key.clone(), resolve_field(key, value, base)))
                        .collect(),
                ),
                other => other.clone(),
            };
            (label.clone(), entry)
        })
        .collect()
}

fn resolve_field(key: &str, value: &Value, base: &Path) -> Value {
    let join = |s: &str| Value::String(base.join(s).display().to_string());
    match value {
        Value::String(s) if key.ends_with("_path") => join(s),
        Value::Array(items) if key.ends_with("_paths") => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => join(s),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Run every session in order, stopping at the first failure.
pub fn run_batch(
    file: &ConversionFile,
    settings: &BatchSettings,
    cancel: &CancellationToken,
) -> Result<Vec<SessionOutcome>, BatchError> {
    let kinds = file.kinds()?;
    let plans = file.plan(settings)?;
    log::info!("running {} sessions", plans.len());

    let mut outcomes: Vec<SessionOutcome> = Vec::with_capacity(plans.len());
    for plan in plans {
        let completed = || outcomes.iter().map(|o| o.session.clone()).collect::<Vec<_>>();
        if let Some(parent) = plan.output.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut orchestrator = plan.open(&kinds)?;
        let prepared = orchestrator.prepare_metadata(Some(&plan.metadata)).map(|_| ());
        let result =
            prepared.and_then(|()| orchestrator.run(&plan.output, settings.mode, &plan.options, cancel));
        let report = result.map_err(|source| BatchError::Conversion {
            session: plan.name.clone(),
            completed: completed(),
            source,
        })?;

        log::info!("session '{}' written to {}", plan.name, report.output.display());
        outcomes.push(SessionOutcome {
            session: plan.name,
            labels: plan.labels,
            report,
        });
    }
    Ok(outcomes)
}

/// Dry-run every session: source data, adapters, metadata and options.
///
/// Nothing is written.
pub fn check_batch(file: &ConversionFile, settings: &BatchSettings) -> Report {
    let mut report = Report::new("Validation Report", file.base_dir.display().to_string());

    let kinds = match file.kinds() {
        Ok(kinds) => {
            report.push(Check::ok("adapter kinds"));
            kinds
        }
        Err(e) => {
            report.push(Check::failed("adapter kinds", e.to_string()));
            return report;
        }
    };
    if file.session_count() == 0 {
        report.push(Check::warning("sessions", "no sessions defined"));
    }

    for (experiment, exp) in &file.experiments {
        for index in 0..exp.sessions.len() {
            let name = format!("{experiment}/{}", index + 1);
            report.extend_prefixed(&name, check_session(file, &kinds, experiment, exp, index, settings));
        }
    }
    report
}

fn check_session(
    file: &ConversionFile,
    kinds: &IndexMap<String, AdapterKind>,
    experiment: &str,
    exp: &Experiment,
    index: usize,
    settings: &BatchSettings,
) -> Report {
    const STEPS: [&str; 4] = ["source data", "adapters", "metadata", "options"];
    let mut report = Report::new("Session", experiment);
    let skip_rest = |report: &mut Report, from: usize| {
        for step in &STEPS[from..] {
            report.push(Check::skipped(*step, "earlier check failed"));
        }
    };

    let plan = match file.plan_session(experiment, exp, index, settings) {
        Ok(plan) => {
            report.push(Check::ok(STEPS[0]));
            plan
        }
        Err(e) => {
            report.push(Check::failed(STEPS[0], e.to_string()));
            skip_rest(&mut report, 1);
            return report;
        }
    };

    let mut orchestrator = match plan.open(kinds) {
        Ok(orchestrator) => {
            report.push(Check::ok(STEPS[1]));
            orchestrator
        }
        Err(e) => {
            report.push(Check::failed(STEPS[1], e.to_string()));
            skip_rest(&mut report, 2);
            return report;
        }
    };

    match orchestrator.prepare_metadata(Some(&plan.metadata)) {
        Ok(metadata) if metadata.get_path("File.session_id").is_none() => {
            report.push(Check::warning(STEPS[2], "File.session_id is not set"))
        }
        Ok(_) => report.push(Check::ok(STEPS[2])),
        Err(e) => report.push(Check::failed(STEPS[2], e.to_string())),
    }

    match orchestrator.resolve_options(&plan.options) {
        Ok(_) => report.push(Check::ok(STEPS[3])),
        Err(e) => report.push(Check::failed(STEPS[3], e.to_string())),
    }

    if plan.output.exists() && settings.mode == StoreMode::Create {
        report.push(Check::warning(
            "output",
            format!("{} already exists", plan.output.display()),
        ));
    }
    report
}
