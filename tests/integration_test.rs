//! Integration tests for confluence
//!
//! These tests drive real adapters through the orchestrator into a store on
//! disk and read the result back.

use std::fs;
use std::path::{Path, PathBuf};

use confluence::prelude::*;
use confluence::store::Codec;
use serde_json::{json, Map, Value};
use tempfile::tempdir;

const META: &str = "\
nSavedChans=3
imSampRate=2500
fileCreateTime=2022-06-15T14:20:00
typeThis=imec
imDatPrb_type=24
";

/// Write a `(frames, 3)` recording where sample = frame * 3 + channel.
fn write_lfp(dir: &Path, frames: u64) -> PathBuf {
    let bin = dir.join("rec_g0_t0.imec0.lf.bin");
    let bytes: Vec<u8> = (0..frames * 3)
        .flat_map(|i| ((i % 30_000) as i16).to_le_bytes())
        .collect();
    fs::write(&bin, bytes).unwrap();
    fs::write(dir.join("rec_g0_t0.imec0.lf.meta"), META).unwrap();
    bin
}

fn write_trials(dir: &Path, rows: usize) -> PathBuf {
    let path = dir.join("trials.csv");
    let mut text = String::from("start_time,stop_time,outcome\n");
    for i in 0..rows {
        let outcome = if i % 3 == 0 { "miss" } else { "hit" };
        text.push_str(&format!("{}.0,{}.5,{}\n", i, i, outcome));
    }
    fs::write(&path, text).unwrap();
    path
}

fn two_adapter_orchestrator(bin: &Path, csv: &Path) -> Orchestrator {
    let converter = Converter::new()
        .with(
            "Recording",
            AdapterKind::BinaryRecording
                .open(&json!({"file_path": bin}))
                .unwrap(),
        )
        .unwrap()
        .with(
            "Trials",
            AdapterKind::CsvTimeIntervals
                .open(&json!({"file_path": csv}))
                .unwrap(),
        )
        .unwrap();
    Orchestrator::new(converter)
}

fn options(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// Test the complete convert-inspect cycle with two adapters
#[test]
fn test_two_adapter_conversion() {
    let dir = tempdir().unwrap();
    let bin = write_lfp(dir.path(), 5_000);
    let csv = write_trials(dir.path(), 40);
    let output = dir.path().join("session.confluence");

    let mut orchestrator = two_adapter_orchestrator(&bin, &csv);
    let schemas = orchestrator.compose_schemas().unwrap().clone();
    orchestrator
        .validate_source(&json!({"Recording": {"file_path": bin}, "Trials": {"file_path": csv}}))
        .unwrap();
    assert!(schemas.metadata.property("Ecephys.ElectricalSeriesLFP").is_some());
    assert!(schemas.metadata.property("TimeIntervals.trials").is_some());

    let overrides = MetadataTree::from_value(json!({
        "File": {"lab": "Cortex Lab", "session_description": "LFP during task"}
    }))
    .unwrap();
    orchestrator.prepare_metadata(Some(&overrides)).unwrap();

    let report = orchestrator
        .run(
            &output,
            StoreMode::Create,
            &options(json!({"Recording": {"buffer_bytes": 6000, "compression_level": 1}})),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(orchestrator.state(), PipelineState::Completed);
    assert_eq!(report.committed, vec!["Recording", "Trials"]);
    assert!(report.manifest.finished);

    let reader = StoreReader::open(&output).unwrap();
    let metadata = reader.metadata().unwrap();
    assert_eq!(metadata.get_path("File.lab"), Some(&json!("Cortex Lab")));
    assert_eq!(
        metadata.get_path("File.session_description"),
        Some(&json!("LFP during task"))
    );
    assert_eq!(
        metadata.get_path("File.session_start_time"),
        Some(&json!("2022-06-15T14:20:00"))
    );
    assert_eq!(
        metadata.get_path("File.identifier").and_then(Value::as_str),
        Some(orchestrator.identifier())
    );

    let (meta, data) = reader.read_array("acquisition/ElectricalSeriesLFP").unwrap();
    assert_eq!(meta.shape, vec![5_000, 3]);
    assert_eq!(meta.codec, Codec::Gzip);
    assert!(meta.complete);
    assert_eq!(data, fs::read(&bin).unwrap());

    let rows: usize = reader
        .read_table("intervals/trials")
        .unwrap()
        .iter()
        .map(|b| b.num_rows())
        .sum();
    assert_eq!(rows, 40);
}

/// Metadata violations are reported before any output exists
#[test]
fn test_invalid_metadata_touches_nothing() {
    let dir = tempdir().unwrap();
    let csv = write_trials(dir.path(), 5);
    let converter = Converter::new()
        .with(
            "Trials",
            AdapterKind::CsvTimeIntervals
                .open(&json!({"file_path": csv}))
                .unwrap(),
        )
        .unwrap();
    let mut orchestrator = Orchestrator::new(converter);
    orchestrator.compose_schemas().unwrap();

    // No adapter supplies a session start time.
    let err = orchestrator.prepare_metadata(None).unwrap_err();
    match err {
        ConversionError::Invalid { what, violation } => {
            assert_eq!(what, "metadata");
            assert_eq!(violation.path, "File.session_start_time");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(orchestrator.state(), PipelineState::SchemaReady);

    let overrides = MetadataTree::from_value(json!({
        "File": {"session_start_time": "2022-06-15T00:00:00"}
    }))
    .unwrap();
    orchestrator.prepare_metadata(Some(&overrides)).unwrap();

    let output = dir.path().join("bad-options.confluence");
    let err = orchestrator
        .run(
            &output,
            StoreMode::Create,
            &options(json!({"Trials": {"compression": 3}})),
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, ConversionError::Invalid { what: "options", .. }));
    assert!(!output.exists());
}

/// Option values the second adapter refuses stop the run before the first adapter writes
#[test]
fn test_refused_options_leave_no_partial_output() {
    let dir = tempdir().unwrap();
    let bin = write_lfp(dir.path(), 300);
    let csv = write_trials(dir.path(), 3);

    let mut orchestrator = two_adapter_orchestrator(&bin, &csv);
    orchestrator.compose_schemas().unwrap();
    orchestrator.prepare_metadata(None).unwrap();

    for (name, bad) in [
        ("codec", json!({"Trials": {"compression": "brotli"}})),
        ("level", json!({"Trials": {"compression_level": 4.5}})),
        ("budget", json!({"Recording": {"buffer_bytes": -1}})),
    ] {
        let output = dir.path().join(format!("{name}.confluence"));
        let err = orchestrator
            .run(&output, StoreMode::Create, &options(bad), &CancellationToken::new())
            .unwrap_err();
        assert!(
            matches!(err, ConversionError::Invalid { what: "options", .. }),
            "{name}: {err}"
        );
        assert!(err.committed().is_empty());
        assert!(!output.exists(), "{name} created a store");
        assert_eq!(orchestrator.state(), PipelineState::MetadataReady);
    }
}

/// A failing adapter leaves the earlier adapter's datasets in place
#[test]
fn test_failure_keeps_committed_output() {
    let dir = tempdir().unwrap();
    let bin = write_lfp(dir.path(), 300);
    let csv = dir.path().join("trials.csv");
    fs::write(&csv, "start_time,stop_time\n0,1\nlater,2\n").unwrap();
    let output = dir.path().join("partial.confluence");

    let mut orchestrator = two_adapter_orchestrator(&bin, &csv);
    orchestrator.compose_schemas().unwrap();
    orchestrator.prepare_metadata(None).unwrap();
    let err = orchestrator
        .run(&output, StoreMode::Create, &Map::new(), &CancellationToken::new())
        .unwrap_err();

    assert_eq!(err.committed(), ["Recording".to_string()]);
    assert!(matches!(err, ConversionError::AdapterExecution { ref label, .. } if label == "Trials"));
    assert_eq!(orchestrator.state(), PipelineState::Failed);

    let reader = StoreReader::open(&output).unwrap();
    assert!(!reader.manifest().finished);
    assert!(reader.array_meta("acquisition/ElectricalSeriesLFP").unwrap().complete);
}

/// A pre-cancelled token stops the run before the first chunk
#[test]
fn test_cancelled_run() {
    let dir = tempdir().unwrap();
    let bin = write_lfp(dir.path(), 300);
    let csv = write_trials(dir.path(), 3);

    let mut orchestrator = two_adapter_orchestrator(&bin, &csv);
    orchestrator.compose_schemas().unwrap();
    orchestrator.prepare_metadata(None).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator
        .run(
            &dir.path().join("cancelled.confluence"),
            StoreMode::Create,
            &Map::new(),
            &cancel,
        )
        .unwrap_err();
    assert!(matches!(err, ConversionError::Cancelled { ref committed } if committed.is_empty()));
}

/// Stub runs truncate arrays and tables to the leading entries
#[test]
fn test_stub_run_through_batch_file() {
    let dir = tempdir().unwrap();
    write_lfp(dir.path(), 2_000);
    write_trials(dir.path(), 250);
    fs::write(
        dir.path().join("conversion.toml"),
        r#"
[adapters]
Recording = "binary-recording"
Trials = "csv-time-intervals"

[conversion_options]
stub_test = true

[[experiments.task.sessions]]
output_name = "stub"
source_data.Recording.file_path = "rec_g0_t0.imec0.lf.bin"
source_data.Trials.file_path = "trials.csv"
"#,
    )
    .unwrap();

    let file = ConversionFile::from_file(dir.path().join("conversion.toml")).unwrap();
    let outcomes = run_batch(&file, &BatchSettings::default(), &CancellationToken::new()).unwrap();
    assert_eq!(outcomes.len(), 1);

    let reader = StoreReader::open(dir.path().join("stub.confluence")).unwrap();
    assert_eq!(
        reader.array_meta("acquisition/ElectricalSeriesLFP").unwrap().shape,
        vec![100, 3]
    );
    let rows: usize = reader
        .read_table("intervals/trials")
        .unwrap()
        .iter()
        .map(|b| b.num_rows())
        .sum();
    assert_eq!(rows, 100);
}

/// Overwrite replaces a finished store; Create refuses an existing one
#[test]
fn test_overwrite_mode_replaces_finished_store() {
    let dir = tempdir().unwrap();
    let bin = write_lfp(dir.path(), 100);
    let csv = write_trials(dir.path(), 2);
    let output = dir.path().join("twice.confluence");

    for mode in [StoreMode::Create, StoreMode::Overwrite] {
        let mut orchestrator = two_adapter_orchestrator(&bin, &csv);
        orchestrator.compose_schemas().unwrap();
        orchestrator.prepare_metadata(None).unwrap();
        orchestrator
            .run(&output, mode, &Map::new(), &CancellationToken::new())
            .unwrap();
    }

    let mut orchestrator = two_adapter_orchestrator(&bin, &csv);
    orchestrator.compose_schemas().unwrap();
    orchestrator.prepare_metadata(None).unwrap();
    let err = orchestrator
        .run(&output, StoreMode::Create, &Map::new(), &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, ConversionError::StoreError(_)));
}
