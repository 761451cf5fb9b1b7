use super::*;
use serde_json::json;

fn tree(value: Value) -> MetadataTree {
    MetadataTree::from_value(value).unwrap()
}

#[test]
fn test_later_source_wins_for_leaves() {
    let a = tree(json!({"File": {"lab": "A"}, "Ecephys": {"Device": "probe"}}));
    let b = tree(json!({"File": {"lab": "B", "institution": "X"}}));

    let merged = aggregate_metadata([("a", &a), ("b", &b)], None);

    assert_eq!(merged.get_path("File.lab"), Some(&json!("B")));
    assert_eq!(merged.get_path("File.institution"), Some(&json!("X")));
    assert_eq!(merged.get_path("Ecephys.Device"), Some(&json!("probe")));
}

#[test]
fn test_overrides_win_over_all_sources() {
    let a = tree(json!({"File": {"session_description": "a"}}));
    let b = tree(json!({"File": {"session_description": "b"}}));
    let o = tree(json!({"File": {"session_description": "user"}}));

    let merged = aggregate_metadata([("a", &a), ("b", &b)], Some(&o));
    assert_eq!(
        merged.get_path("File.session_description"),
        Some(&json!("user"))
    );
}

#[test]
fn test_type_clash_overwrites_in_order() {
    let a = tree(json!({"Subject": {"species": "mouse"}}));
    let b = tree(json!({"Subject": "unknown"}));

    let merged = aggregate_metadata([("a", &a), ("b", &b)], None);
    assert_eq!(merged.get("Subject"), Some(&json!("unknown")));

    let merged = aggregate_metadata([("b", &b), ("a", &a)], None);
    assert_eq!(merged.get_path("Subject.species"), Some(&json!("mouse")));
}

#[test]
fn test_merge_preserves_key_order() {
    let a = tree(json!({"z": 1, "a": 2}));
    let b = tree(json!({"m": 3, "z": 4}));
    let merged = aggregate_metadata([("a", &a), ("b", &b)], None);
    let keys: Vec<_> = merged.as_map().keys().cloned().collect();
    assert_eq!(keys, vec!["z", "a", "m"]);
}

#[test]
fn test_empty_aggregation() {
    let merged = aggregate_metadata(std::iter::empty(), None);
    assert!(merged.is_empty());
}

#[test]
fn test_non_object_root_rejected() {
    let err = MetadataTree::from_value(json!([1, 2])).unwrap_err();
    assert!(matches!(err, MetadataError::NotAnObject("array")));
}

#[test]
fn test_set_path_creates_intermediate_nodes() {
    let mut metadata = MetadataTree::new();
    metadata.set_path("Ecephys.ElectricalSeriesRaw.name", "raw");
    metadata.set_path("Ecephys.Device", json!({"name": "probe"}));
    assert_eq!(
        metadata.get_path("Ecephys.ElectricalSeriesRaw.name"),
        Some(&json!("raw"))
    );
    assert_eq!(metadata.get_path("Ecephys.Device.name"), Some(&json!("probe")));
    assert_eq!(metadata.get_path("Ecephys.Missing"), None);
}

#[test]
fn test_toml_parsing_converts_datetimes() {
    let metadata = MetadataTree::from_toml_str(
        r#"
        [File]
        session_start_time = 2020-11-03T10:35:10
        experimenter = ["Ada"]
        "#,
    )
    .unwrap();
    assert_eq!(
        metadata.get_path("File.session_start_time"),
        Some(&json!("2020-11-03T10:35:10"))
    );
    assert_eq!(metadata.get_path("File.experimenter"), Some(&json!(["Ada"])));
}

#[test]
fn test_from_file_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let json_path = dir.path().join("meta.json");
    std::fs::write(&json_path, r#"{"File": {"lab": "L"}}"#).unwrap();
    let metadata = MetadataTree::from_file(&json_path).unwrap();
    assert_eq!(metadata.get_path("File.lab"), Some(&json!("L")));

    let yaml_path = dir.path().join("meta.yaml");
    std::fs::write(&yaml_path, "File: {}").unwrap();
    assert!(matches!(
        MetadataTree::from_file(&yaml_path),
        Err(MetadataError::UnsupportedFormat(ext)) if ext == "yaml"
    ));
}

#[test]
fn test_default_root_metadata_satisfies_defaults() {
    let defaults = default_root_metadata("abc-123");
    assert_eq!(
        defaults.get_path("File.session_description"),
        Some(&json!(DEFAULT_SESSION_DESCRIPTION))
    );
    assert_eq!(defaults.get_path("File.identifier"), Some(&json!("abc-123")));
}

#[test]
fn test_base_schema_requires_session_start_time() {
    let schema = base_metadata_schema();
    let defaults = default_root_metadata("abc").into_value();
    let violation = crate::schema::validate(&defaults, &schema).unwrap_err();
    assert_eq!(violation.path, "File.session_start_time");

    let mut complete = default_root_metadata("abc");
    complete.set_path("File.session_start_time", "2020-01-01T00:00:00");
    assert!(crate::schema::validate(&complete.into_value(), &schema).is_ok());
}
