use std::fs;
use std::path::{Path, PathBuf};

use arrow::array::Array;
use serde_json::{json, Map, Value};

use super::binary::{parse_meta, InterleavedSource};
use super::ttl::{detect_edges, falling_frames, rising_frames, EdgeDetector};
use super::*;
use crate::adapter::RunContext;
use crate::chunking::{CancellationToken, ChunkSlice, ChunkSource};
use crate::metadata::MetadataTree;
use crate::schema::validate;
use crate::store::{OutputStore, StoreMode, StoreReader};

const IMEC_META: &str = "\
nSavedChans=4
imSampRate=30000
fileCreateTime=2020-11-03T10:35:10
typeThis=imec
imDatPrb_type=0
imDatFx_pn=NP2_FLEX_0
~imroTbl=(0,384)(0 0 0 500 250 1)
";

/// Write `frames` x `channels` samples where sample = frame * channels + channel.
fn write_recording(dir: &Path, name: &str, frames: u64, channels: u64, meta: &str) -> PathBuf {
    let bin = dir.join(format!("{name}.bin"));
    let bytes: Vec<u8> = (0..frames * channels)
        .flat_map(|i| (i as i16).to_le_bytes())
        .collect();
    fs::write(&bin, bytes).unwrap();
    fs::write(dir.join(format!("{name}.meta")), meta).unwrap();
    bin
}

fn write_csv(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("trials.csv");
    fs::write(&path, text).unwrap();
    path
}

fn run_into_store(
    adapter: &mut dyn Adapter,
    options: Map<String, Value>,
    metadata: &MetadataTree,
) -> (tempfile::TempDir, StoreReader) {
    let out = tempfile::tempdir().unwrap();
    let mut store = OutputStore::create(out.path().join("out.confluence"), StoreMode::Create).unwrap();
    let cancel = CancellationToken::new();
    let mut ctx = RunContext::new(&mut store, &cancel);
    adapter.run_conversion(&mut ctx, metadata, &options).unwrap();
    let root = store.root().to_path_buf();
    store.finish().unwrap();
    (out, StoreReader::open(root).unwrap())
}

fn options(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_parse_meta() {
    let meta = parse_meta(IMEC_META);
    assert_eq!(meta.get("nSavedChans").map(String::as_str), Some("4"));
    assert_eq!(meta.get("~imroTbl").map(String::as_str), Some("(0,384)(0 0 0 500 250 1)"));
    assert!(parse_meta("no separator\n=empty key\n").is_empty());
}

#[test]
fn test_stream_detection() {
    let empty = Default::default();
    assert_eq!(
        StreamKind::detect(Path::new("run_g0_t0.imec0.ap.bin"), &empty),
        StreamKind::ActionPotential
    );
    assert_eq!(
        StreamKind::detect(Path::new("run_g0_t0.imec0.lf.bin"), &empty),
        StreamKind::LocalFieldPotential
    );
    assert_eq!(
        StreamKind::detect(Path::new("run_g0_t0.nidq.bin"), &empty),
        StreamKind::Nidq
    );

    let nidq = parse_meta("typeThis=nidq");
    assert_eq!(StreamKind::detect(Path::new("data.bin"), &nidq), StreamKind::Nidq);
    assert_eq!(StreamKind::LocalFieldPotential.series_key(), "ElectricalSeriesLFP");
}

#[test]
fn test_binary_open_reads_sidecar_only() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_recording(dir.path(), "run.imec0.ap", 1000, 4, IMEC_META);

    let adapter = BinaryRecordingAdapter::open(BinarySource {
        file_path: bin,
        meta_path: None,
    })
    .unwrap();
    assert_eq!(adapter.shape(), [1000, 4]);
    assert_eq!(adapter.sampling_rate(), 30000.0);
    assert_eq!(adapter.stream(), StreamKind::ActionPotential);

    let metadata = adapter.metadata();
    assert_eq!(
        metadata.get_path("File.session_start_time"),
        Some(&json!("2020-11-03T10:35:10"))
    );
    assert_eq!(
        metadata.get_path("Ecephys.ElectricalSeriesRaw.name"),
        Some(&json!("ElectricalSeriesRaw"))
    );
    let device = &metadata.get_path("Ecephys.Device").unwrap()[0];
    assert_eq!(device["name"], json!("Neuropixel-Imec"));
    assert_eq!(device["manufacturer"], json!("Imec"));
    let details: Value = serde_json::from_str(device["description"].as_str().unwrap()).unwrap();
    assert_eq!(details["probe_type_description"], json!("NP1.0"));
    assert_eq!(details["flex_part_number"], json!("NP2_FLEX_0"));
    assert_eq!(
        metadata.get_path("Ecephys.ElectrodeGroup").unwrap()[0]["device"],
        json!("Neuropixel-Imec")
    );

    assert!(validate(&metadata.clone().into_value(), &adapter.metadata_schema()).is_ok());
}

#[test]
fn test_binary_trailing_partial_frame_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_recording(dir.path(), "run.imec0.lf", 10, 4, IMEC_META);
    let mut bytes = fs::read(&bin).unwrap();
    bytes.extend([1, 2, 3]);
    fs::write(&bin, bytes).unwrap();

    let adapter = BinaryRecordingAdapter::open(BinarySource {
        file_path: bin,
        meta_path: None,
    })
    .unwrap();
    assert_eq!(adapter.shape(), [10, 4]);
    assert_eq!(adapter.stream(), StreamKind::LocalFieldPotential);
}

#[test]
fn test_binary_missing_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("orphan.bin");
    fs::write(&bin, [0u8; 16]).unwrap();

    let err = BinaryRecordingAdapter::open(BinarySource {
        file_path: bin,
        meta_path: None,
    })
    .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidSource(_)));
}

#[test]
fn test_binary_missing_channel_count() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_recording(dir.path(), "run.ap", 10, 4, "imSampRate=30000\n");

    let err = BinaryRecordingAdapter::open(BinarySource {
        file_path: bin,
        meta_path: None,
    })
    .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidData(msg) if msg.contains("nSavedChans")));
}

#[test]
fn test_nidq_device() {
    let dir = tempfile::tempdir().unwrap();
    let meta = "nSavedChans=2\nniSampRate=25000\ntypeThis=nidq\nniDev1ProductName=PXI-6133\n";
    let bin = write_recording(dir.path(), "run.nidq", 50, 2, meta);

    let adapter = BinaryRecordingAdapter::open(BinarySource {
        file_path: bin,
        meta_path: None,
    })
    .unwrap();
    assert_eq!(adapter.sampling_rate(), 25000.0);
    let metadata = adapter.metadata();
    let device = &metadata.get_path("Ecephys.Device").unwrap()[0];
    assert_eq!(device["name"], json!("PXI-6133"));
    assert_eq!(device["manufacturer"], json!("National Instruments"));
    assert!(metadata.get_path("Ecephys.ElectricalSeriesNIDQ").is_some());
    assert!(metadata.get_path("File.session_start_time").is_none());
}

#[test]
fn test_interleaved_source_reads_column_boxes() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_recording(dir.path(), "run.ap", 6, 4, IMEC_META);
    let mut source = InterleavedSource::open(&bin, [6, 4]).unwrap();

    let mut buf = Vec::new();
    source
        .read_chunk(
            &ChunkSlice {
                offset: vec![2, 1],
                extent: vec![2, 2],
            },
            &mut buf,
        )
        .unwrap();
    let samples: Vec<i16> = buf
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(samples, vec![9, 10, 13, 14]);

    buf.clear();
    source
        .read_chunk(
            &ChunkSlice {
                offset: vec![5, 0],
                extent: vec![1, 4],
            },
            &mut buf,
        )
        .unwrap();
    assert_eq!(buf.len(), 8);
    assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), 20);
}

#[test]
fn test_binary_conversion_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_recording(dir.path(), "run.imec0.ap", 1000, 4, IMEC_META);
    let expected = fs::read(&bin).unwrap();

    let mut adapter = BinaryRecordingAdapter::open(BinarySource {
        file_path: bin,
        meta_path: None,
    })
    .unwrap();
    let metadata = adapter.metadata();
    let (_out, reader) = run_into_store(
        &mut adapter,
        options(json!({"chunk_shape": [128, 2], "starting_time": 1.5})),
        &metadata,
    );

    let (meta, data) = reader.read_array("acquisition/ElectricalSeriesRaw").unwrap();
    assert_eq!(meta.shape, vec![1000, 4]);
    assert_eq!(meta.chunk_shape, vec![128, 2]);
    assert!(meta.complete);
    assert_eq!(meta.attributes["rate"], json!(30000.0));
    assert_eq!(meta.attributes["starting_time"], json!(1.5));
    assert_eq!(data, expected);
}

#[test]
fn test_binary_es_key_and_stub() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_recording(dir.path(), "run.imec0.ap", 500, 4, IMEC_META);
    let mut adapter = BinaryRecordingAdapter::open(BinarySource {
        file_path: bin,
        meta_path: None,
    })
    .unwrap();

    let mut metadata = adapter.metadata();
    metadata.set_path(
        "Ecephys.ElectricalSeriesCustom",
        json!({"name": "CustomSeries", "description": "renamed"}),
    );
    let (_out, reader) = run_into_store(
        &mut adapter,
        options(json!({"es_key": "ElectricalSeriesCustom", "stub_test": true})),
        &metadata,
    );

    let meta = reader.array_meta("acquisition/CustomSeries").unwrap();
    assert_eq!(meta.shape, vec![100, 4]);
    assert_eq!(meta.attributes["description"], json!("renamed"));
    assert!(reader.array_meta("acquisition/ElectricalSeriesRaw").is_err());
}

#[test]
fn test_csv_open_requires_interval_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "start_time,condition\n0.0,a\n");

    let err = CsvTimeIntervalsAdapter::open(CsvSource {
        file_path: path,
        delimiter: None,
    })
    .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidData(msg) if msg.contains("stop_time")));
}

#[test]
fn test_csv_conversion_infers_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "start_time,stop_time,condition,correct\n0.0,1.0,left,1\n1.5,2.5,right,\n3,4,left,0\n",
    );
    let mut adapter = CsvTimeIntervalsAdapter::open(CsvSource {
        file_path: path,
        delimiter: None,
    })
    .unwrap();
    assert_eq!(adapter.headers(), ["start_time", "stop_time", "condition", "correct"]);

    let metadata = adapter.metadata();
    assert!(metadata
        .get_path("TimeIntervals.trials.table_description")
        .and_then(Value::as_str)
        .unwrap()
        .contains("trials.csv"));

    let (_out, reader) = run_into_store(
        &mut adapter,
        options(json!({
            "column_name_mapping": {"condition": "stimulus"},
            "column_descriptions": {"stimulus": "Side of the cue"},
        })),
        &metadata,
    );

    let batches = reader.read_table("intervals/trials").unwrap();
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 3);
    let schema = batch.schema();
    let names: Vec<_> = schema.fields().iter().map(|f| f.name().clone()).collect();
    assert_eq!(names, vec!["start_time", "stop_time", "stimulus", "correct"]);
    assert_eq!(schema.field(0).data_type(), &arrow::datatypes::DataType::Float64);
    assert_eq!(schema.field(2).data_type(), &arrow::datatypes::DataType::Utf8);
    assert_eq!(batch.column(3).null_count(), 1);

    let attributes = reader.table_attributes("intervals/trials").unwrap();
    let descriptions: Value = serde_json::from_str(&attributes["column_descriptions"]).unwrap();
    assert_eq!(descriptions["stimulus"], json!("Side of the cue"));
}

#[test]
fn test_csv_tag_and_delimiter() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "start_time;stop_time\n0;1\n");
    let mut adapter = CsvTimeIntervalsAdapter::open(CsvSource {
        file_path: path,
        delimiter: Some(';'),
    })
    .unwrap();

    let metadata = MetadataTree::from_value(json!({
        "TimeIntervals": {"epochs": {"table_name": "epochs", "table_description": "sleep epochs"}}
    }))
    .unwrap();
    let (_out, reader) = run_into_store(&mut adapter, options(json!({"tag": "epochs"})), &metadata);

    let attributes = reader.table_attributes("intervals/epochs").unwrap();
    assert_eq!(attributes["description"], "sleep epochs");
}

#[test]
fn test_csv_stub_keeps_leading_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut text = String::from("start_time,stop_time\n");
    for i in 0..150 {
        text.push_str(&format!("{},{}\n", i, i + 1));
    }
    let path = write_csv(dir.path(), &text);
    let mut adapter = CsvTimeIntervalsAdapter::open(CsvSource {
        file_path: path,
        delimiter: None,
    })
    .unwrap();

    let metadata = adapter.metadata();
    let (_out, reader) = run_into_store(&mut adapter, options(json!({"stub_test": true})), &metadata);
    let rows: usize = reader
        .read_table("intervals/trials")
        .unwrap()
        .iter()
        .map(|b| b.num_rows())
        .sum();
    assert_eq!(rows, 100);
}

#[test]
fn test_csv_non_numeric_times_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "start_time,stop_time\nsoon,1\n");
    let mut adapter = CsvTimeIntervalsAdapter::open(CsvSource {
        file_path: path,
        delimiter: None,
    })
    .unwrap();

    let out = tempfile::tempdir().unwrap();
    let mut store = OutputStore::create(out.path().join("s"), StoreMode::Create).unwrap();
    let cancel = CancellationToken::new();
    let mut ctx = RunContext::new(&mut store, &cancel);
    let err = adapter
        .run_conversion(&mut ctx, &MetadataTree::new(), &Map::new())
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidData(msg) if msg.contains("start_time")));
}

#[test]
fn test_adapter_kind_names() {
    for kind in AdapterKind::ALL {
        assert_eq!(kind.as_str().parse::<AdapterKind>().unwrap(), kind);
        assert_eq!(kind.to_string(), kind.as_str());
    }
    assert!(matches!(
        "neuralynx".parse::<AdapterKind>(),
        Err(AdapterError::UnknownKind(name)) if name == "neuralynx"
    ));
}

#[test]
fn test_adapter_kind_source_schema_and_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "start_time,stop_time\n0,1\n");
    let source = json!({"file_path": path});

    let kind = AdapterKind::CsvTimeIntervals;
    assert!(validate(&source, &kind.source_schema()).is_ok());
    assert!(validate(&json!({"folder_path": "x"}), &kind.source_schema()).is_err());

    let adapter = kind.open(&source).unwrap();
    assert_eq!(adapter.name(), "csv-time-intervals");
    assert_eq!(adapter.source_schema(), kind.source_schema());

    assert!(matches!(
        kind.open(&json!({"file_path": 3})),
        Err(AdapterError::InvalidSource(_))
    ));
}

#[test]
fn test_csv_starting_time_shifts_time_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "start_time,stop_time,reward_time,duration\n0.0,1.0,0.5,1.0\n2.0,3.0,,1.0\n",
    );
    let mut adapter = CsvTimeIntervalsAdapter::open(CsvSource {
        file_path: path,
        delimiter: None,
    })
    .unwrap();
    assert!(adapter
        .options_schema()
        .property("starting_time")
        .is_some());

    let metadata = adapter.metadata();
    let (_out, reader) = run_into_store(
        &mut adapter,
        options(json!({"starting_time": 10.0, "column_name_mapping": {"reward_time": "reward"}})),
        &metadata,
    );

    let batch = &reader.read_table("intervals/trials").unwrap()[0];
    let column = |i: usize| {
        batch
            .column(i)
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .unwrap()
            .clone()
    };
    assert_eq!(column(0).values().to_vec(), vec![10.0, 12.0]);
    assert_eq!(column(1).values().to_vec(), vec![11.0, 13.0]);
    assert_eq!(column(2).value(0), 10.5);
    assert!(column(2).is_null(1));
    assert_eq!(column(3).values().to_vec(), vec![1.0, 1.0]);
}

#[test]
fn test_ttl_edges_default_to_mean_threshold() {
    let trace = [0.0, 0.0, 5.0, 5.0, 0.0, 0.0, 5.0];
    assert_eq!(rising_frames(&trace, None), vec![2, 6]);
    assert_eq!(falling_frames(&trace, None), vec![4]);
    assert_eq!(detect_edges(&trace, None).frames(), vec![2, 4, 6]);
    assert!(detect_edges(&[], None).frames().is_empty());
}

#[test]
fn test_ttl_sample_on_threshold_is_its_own_state() {
    assert_eq!(rising_frames(&[0.0, 1.0, 2.0], Some(1.0)), vec![1, 2]);
    assert_eq!(falling_frames(&[2.0, 1.0, 0.0], Some(1.0)), vec![1, 2]);
}

#[test]
fn test_edge_detector_spans_blocks() {
    let trace: Vec<f64> = (0..40).map(|i| if (i / 5) % 2 == 1 { 3.3 } else { 0.0 }).collect();
    let whole = detect_edges(&trace, Some(1.0));

    let mut detector = EdgeDetector::new(1.0);
    for block in trace.chunks(3) {
        detector.push(block.iter().copied());
    }
    assert_eq!(detector.finish(), whole);
    assert_eq!(whole.rising, vec![5, 15, 25, 35]);
    assert_eq!(whole.falling, vec![10, 20, 30]);
}

const NIDQ_TTL_META: &str = "\
nSavedChans=2
niSampRate=1000
typeThis=nidq
";

#[test]
fn test_nidq_ttl_event_times() {
    let dir = tempfile::tempdir().unwrap();
    let analog: [i16; 10] = [0, 0, 1000, 1000, 1000, 0, 0, 1000, 0, 0];
    let digital: [i16; 10] = [1, 5, 5, 1, 1, 5, 5, 5, 1, 1];
    let bytes: Vec<u8> = analog
        .iter()
        .zip(&digital)
        .flat_map(|(a, d)| [a.to_le_bytes(), d.to_le_bytes()].concat())
        .collect();
    let bin = dir.path().join("sync_g0_t0.nidq.bin");
    fs::write(&bin, bytes).unwrap();
    fs::write(dir.path().join("sync_g0_t0.nidq.meta"), NIDQ_TTL_META).unwrap();

    let adapter = BinaryRecordingAdapter::open(BinarySource {
        file_path: bin,
        meta_path: None,
    })
    .unwrap();
    assert_eq!(adapter.stream(), StreamKind::Nidq);

    let analog_edges = adapter
        .ttl_edges(0, TtlSignal::Analog { threshold: None })
        .unwrap();
    assert_eq!(analog_edges.rising, vec![2, 7]);
    assert_eq!(analog_edges.falling, vec![5, 8]);
    let times = adapter
        .ttl_event_times(0, TtlSignal::Analog { threshold: None })
        .unwrap();
    assert_eq!(times, vec![0.002, 0.005, 0.007, 0.008]);

    let line = adapter.ttl_edges(1, TtlSignal::DigitalLine(2)).unwrap();
    assert_eq!(line.rising, vec![1, 5]);
    assert_eq!(line.falling, vec![3, 8]);
    assert_eq!(adapter.ttl_edges(1, TtlSignal::DigitalLine(0)).unwrap(), TtlEdges::default());

    assert!(adapter.ttl_edges(2, TtlSignal::DigitalLine(0)).is_err());
    assert!(adapter.ttl_edges(1, TtlSignal::DigitalLine(16)).is_err());
}
