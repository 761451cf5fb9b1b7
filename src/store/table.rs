use std::fs::{self, File};
use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use serde_json::{Map, Value};

use super::types::Codec;
use super::StoreError;

/// File name of a table dataset's payload.
pub const TABLE_FILE: &str = "table.parquet";

/// Writer properties for a table dataset.
fn writer_properties(codec: Codec, level: u32, attributes: &Map<String, Value>) -> WriterProperties {
    let compression = match codec {
        Codec::Gzip => Compression::GZIP(GzipLevel::try_new(level).unwrap_or_default()),
        Codec::None => Compression::UNCOMPRESSED,
    };

    let kv_metadata: Vec<KeyValue> = attributes
        .iter()
        .map(|(k, v)| KeyValue {
            key: k.clone(),
            value: Some(match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        })
        .collect();

    WriterProperties::builder()
        .set_compression(compression)
        .set_key_value_metadata(Some(kv_metadata))
        .build()
}

/// Write `batches` as one Parquet file under `dir`, returning the row count.
pub(super) fn write_table_file(
    dir: &Path,
    batches: &[RecordBatch],
    codec: Codec,
    level: u32,
    attributes: &Map<String, Value>,
) -> Result<usize, StoreError> {
    let Some(first) = batches.first() else {
        return Err(StoreError::InvalidSpec("table has no record batches".into()));
    };

    fs::create_dir_all(dir)?;
    let file = File::create(dir.join(TABLE_FILE))?;
    let props = writer_properties(codec, level, attributes);
    let mut writer = ArrowWriter::try_new(file, first.schema(), Some(props))?;

    let mut rows = 0;
    for batch in batches {
        writer.write(batch)?;
        rows += batch.num_rows();
    }
    writer.close()?;
    Ok(rows)
}
