use std::fs;
use std::path::Path;

use serde_json::json;

use super::*;
use crate::report::CheckStatus;
use crate::schema::ViolationRule;
use crate::store::StoreReader;

const META: &str = "nSavedChans=2\nimSampRate=1000\nfileCreateTime=2021-04-01T09:00:00\ntypeThis=imec\n";

fn write_session_data(dir: &Path, stem: &str, trials: &str) {
    let samples: Vec<u8> = (0..200i16).flat_map(|v| v.to_le_bytes()).collect();
    fs::write(dir.join(format!("{stem}.ap.bin")), samples).unwrap();
    fs::write(dir.join(format!("{stem}.ap.meta")), META).unwrap();
    fs::write(dir.join(format!("{stem}_trials.csv")), trials).unwrap();
}

fn conversion_file(base: &Path) -> ConversionFile {
    let text = r#"
        [adapters]
        Recording = "binary-recording"
        Trials = "csv-time-intervals"

        [metadata.File]
        lab = "global lab"
        institution = "global institution"

        [conversion_options]
        compression = "none"

        [experiments.maze.metadata.File]
        lab = "experiment lab"
        experiment_description = "maze runs"

        [[experiments.maze.sessions]]
        output_name = "day1.confluence"
        source_data.Recording.file_path = "day1.ap.bin"
        source_data.Trials.file_path = "day1_trials.csv"
        metadata.File.session_id = "day1"
        conversion_options.Trials.tag = "trials"
        conversion_options.Trials.compression = "gzip"

        [[experiments.maze.sessions]]
        source_data.Trials.file_path = "day2_trials.csv"
        metadata.File.session_start_time = "2021-04-02T09:00:00"
    "#;
    ConversionFile::from_toml_str(text, base).unwrap()
}

#[test]
fn test_parse_conversion_file() {
    let file = conversion_file(Path::new("/data"));
    assert_eq!(
        file.adapters.keys().collect::<Vec<_>>(),
        vec!["Recording", "Trials"]
    );
    assert_eq!(file.session_count(), 2);
    assert_eq!(file.base_dir(), Path::new("/data"));
    assert_eq!(
        file.kinds().unwrap()["Trials"],
        AdapterKind::CsvTimeIntervals
    );
}

#[test]
fn test_unknown_kind() {
    let file = ConversionFile::from_toml_str("[adapters]\nLfp = \"plexon\"\n", ".").unwrap();
    assert!(matches!(
        file.kinds(),
        Err(BatchError::UnknownKind { label, .. }) if label == "Lfp"
    ));
}

#[test]
fn test_unknown_section_rejected() {
    let err = ConversionFile::from_toml_str("[adapters]\n[outputs]\nx = 1\n", ".").unwrap_err();
    assert!(matches!(err, BatchError::Layout(_)));
}

#[test]
fn test_resolve_source_paths() {
    let source = json!({
        "Recording": {"file_path": "a/b.bin", "meta_path": "/abs/b.meta", "gain": 2},
        "Sorting": {"file_paths": ["x.npy", 3], "folder_path": "sorted"},
    });
    let resolved = resolve_source_paths(source.as_object().unwrap(), Path::new("/data"));
    assert_eq!(resolved["Recording"]["file_path"], json!("/data/a/b.bin"));
    assert_eq!(resolved["Recording"]["meta_path"], json!("/abs/b.meta"));
    assert_eq!(resolved["Recording"]["gain"], json!(2));
    assert_eq!(resolved["Sorting"]["file_paths"], json!(["/data/x.npy", 3]));
    assert_eq!(resolved["Sorting"]["folder_path"], json!("/data/sorted"));
}

#[test]
fn test_plan_merges_metadata_and_options() {
    let mut settings = BatchSettings::default();
    settings.option_defaults.insert("buffer_bytes".into(), json!(4096));
    settings.option_defaults.insert("compression".into(), json!("gzip"));
    let file = conversion_file(Path::new("/data"));
    let plans = file.plan(&settings).unwrap();

    let first = &plans[0];
    assert_eq!(first.name, "maze/1");
    assert_eq!(first.labels, vec!["Recording", "Trials"]);
    assert_eq!(first.output, Path::new("/data/day1.confluence"));
    assert_eq!(first.metadata.get_path("File.lab"), Some(&json!("experiment lab")));
    assert_eq!(
        first.metadata.get_path("File.institution"),
        Some(&json!("global institution"))
    );
    assert_eq!(first.metadata.get_path("File.session_id"), Some(&json!("day1")));

    assert_eq!(first.options["Recording"]["compression"], json!("none"));
    assert_eq!(first.options["Recording"]["buffer_bytes"], json!(4096));
    assert_eq!(first.options["Trials"]["compression"], json!("gzip"));
    assert_eq!(first.options["Trials"]["tag"], json!("trials"));

    let second = &plans[1];
    assert_eq!(second.labels, vec!["Trials"]);
    assert_eq!(second.output, Path::new("/data/maze_session2.confluence"));
}

#[test]
fn test_plan_validates_source_before_opening() {
    let text = r#"
        [adapters]
        Trials = "csv-time-intervals"

        [[experiments.maze.sessions]]
        source_data.Trials.folder_path = "missing"
    "#;
    let file = ConversionFile::from_toml_str(text, "/nowhere").unwrap();
    match file.plan(&BatchSettings::default()) {
        Err(BatchError::InvalidSource { session, violation }) => {
            assert_eq!(session, "maze/1");
            assert_eq!(violation.path, "Trials.file_path");
            assert_eq!(violation.rule, ViolationRule::MissingRequired);
        }
        other => panic!("expected invalid source, got {:?}", other),
    }

    let text = r#"
        [adapters]
        Trials = "csv-time-intervals"

        [[experiments.maze.sessions]]
        source_data.Behavior.file_path = "video.avi"
    "#;
    let file = ConversionFile::from_toml_str(text, "/nowhere").unwrap();
    assert!(matches!(
        file.plan(&BatchSettings::default()),
        Err(BatchError::InvalidSource { violation, .. })
            if violation.path == "Behavior" && violation.rule == ViolationRule::UnexpectedProperty
    ));
}

#[test]
fn test_run_batch_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_session_data(dir.path(), "day1", "start_time,stop_time\n0,1\n1,2\n");
    write_session_data(dir.path(), "day2", "start_time,stop_time\n5,6\n");
    let file = conversion_file(dir.path());
    let settings = BatchSettings {
        output_folder: Some(dir.path().join("out")),
        ..Default::default()
    };

    let outcomes = run_batch(&file, &settings, &CancellationToken::new()).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].report.committed, vec!["Recording", "Trials"]);

    let reader = StoreReader::open(dir.path().join("out/day1.confluence")).unwrap();
    let metadata = reader.metadata().unwrap();
    assert_eq!(metadata.get_path("File.lab"), Some(&json!("experiment lab")));
    assert_eq!(
        metadata.get_path("File.session_start_time"),
        Some(&json!("2021-04-01T09:00:00"))
    );
    let array = reader.array_meta("acquisition/ElectricalSeriesRaw").unwrap();
    assert_eq!(array.shape, vec![100, 2]);
    assert_eq!(array.codec, crate::store::Codec::None);

    assert!(dir.path().join("out/maze_session2.confluence").exists());
}

#[test]
fn test_run_batch_stops_at_first_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_session_data(dir.path(), "day1", "start_time,stop_time\nearly,1\n");
    write_session_data(dir.path(), "day2", "start_time,stop_time\n5,6\n");
    let file = conversion_file(dir.path());

    let err = run_batch(&file, &BatchSettings::default(), &CancellationToken::new()).unwrap_err();
    match err {
        BatchError::Conversion {
            session, completed, ..
        } => {
            assert_eq!(session, "maze/1");
            assert!(completed.is_empty());
        }
        other => panic!("expected conversion failure, got {:?}", other),
    }
    assert!(!dir.path().join("maze_session2.confluence").exists());
}

#[test]
fn test_check_batch_reports_each_session() {
    let dir = tempfile::tempdir().unwrap();
    write_session_data(dir.path(), "day1", "start_time,stop_time\n0,1\n");
    fs::write(dir.path().join("day2_trials.csv"), "onset,offset\n0,1\n").unwrap();
    let file = conversion_file(dir.path());

    let report = check_batch(&file, &BatchSettings::default());
    assert!(report.has_failures());

    let status = |name: &str| {
        report
            .checks
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.status.clone())
            .unwrap()
    };
    assert_eq!(status("maze/1: source data"), CheckStatus::Ok);
    assert_eq!(status("maze/1: options"), CheckStatus::Ok);
    assert_eq!(status("maze/2: source data"), CheckStatus::Ok);
    assert!(matches!(status("maze/2: adapters"), CheckStatus::Failed(msg) if msg.contains("start_time")));
    assert!(matches!(status("maze/2: metadata"), CheckStatus::Skipped(_)));
    assert!(matches!(status("maze/2: options"), CheckStatus::Skipped(_)));
}
