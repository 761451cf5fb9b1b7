//! Delimited-text tables of time intervals (trials, epochs).
//!
//! Each row is one interval; `start_time` and `stop_time` (seconds) are
//! required. Other columns are carried through, typed as `Float64` when
//! every non-empty cell parses as a number and `Utf8` otherwise. The
//! `starting_time` option shifts every numeric `*_time` column, aligning the
//! table with series written by other adapters of the same run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::adapter::{parse_options, Adapter, AdapterError, RunContext, RunOptions};
use crate::chunking::STUB_LEADING_EXTENT;
use crate::metadata::MetadataTree;
use crate::schema::{ObjectSchema, Schema};

/// Columns every interval table must provide.
pub const REQUIRED_COLUMNS: [&str; 2] = ["start_time", "stop_time"];

/// Default table tag.
pub const DEFAULT_TAG: &str = "trials";

/// Source location of an interval table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvSource {
    /// Path to the delimited file
    pub file_path: PathBuf,
    /// Field delimiter (default `,`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
}

impl CsvSource {
    /// Source schema of this adapter kind.
    pub fn schema() -> Schema {
        ObjectSchema::new()
            .required(
                "file_path",
                Schema::string()
                    .with_format("file")
                    .with_description("Path to the .csv file of intervals"),
            )
            .optional(
                "delimiter",
                Schema::string().with_description("Single-character field delimiter"),
            )
            .closed()
            .into()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct IntervalOptions {
    #[serde(flatten)]
    common: RunOptions,
    tag: String,
    starting_time: Option<f64>,
    column_name_mapping: HashMap<String, String>,
    column_descriptions: HashMap<String, String>,
}

impl Default for IntervalOptions {
    fn default() -> Self {
        Self {
            common: RunOptions::default(),
            tag: DEFAULT_TAG.to_string(),
            starting_time: None,
            column_name_mapping: HashMap::new(),
            column_descriptions: HashMap::new(),
        }
    }
}

/// Adapter for one table of time intervals.
#[derive(Debug)]
pub struct CsvTimeIntervalsAdapter {
    source: CsvSource,
    headers: Vec<String>,
}

impl CsvTimeIntervalsAdapter {
    /// Read the header row and check the required columns.
    pub fn open(source: CsvSource) -> Result<Self, AdapterError> {
        let mut reader = reader_builder(&source).from_path(&source.file_path).map_err(|e| {
            AdapterError::InvalidSource(format!("cannot open {}: {}", source.file_path.display(), e))
        })?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if let Some(missing) = REQUIRED_COLUMNS
            .iter()
            .find(|required| !headers.iter().any(|h| h == *required))
        {
            return Err(AdapterError::InvalidData(format!(
                "{} has no '{}' column",
                source.file_path.display(),
                missing
            )));
        }
        log::debug!(
            "opened {} with columns {:?}",
            source.file_path.display(),
            headers
        );
        Ok(Self { source, headers })
    }

    /// Column names of the source file, in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn read_columns(&self, limit: Option<usize>) -> Result<Vec<Vec<String>>, AdapterError> {
        let mut reader = reader_builder(&self.source).from_path(&self.source.file_path)?;
        let mut columns = vec![Vec::new(); self.headers.len()];
        for (row, record) in reader.records().enumerate() {
            if limit.is_some_and(|limit| row >= limit) {
                break;
            }
            let record = record?;
            if record.len() != columns.len() {
                return Err(AdapterError::InvalidData(format!(
                    "row {} has {} fields, expected {}",
                    row + 1,
                    record.len(),
                    columns.len()
                )));
            }
            for (column, field) in columns.iter_mut().zip(record.iter()) {
                column.push(field.trim().to_string());
            }
        }
        Ok(columns)
    }
}

fn reader_builder(source: &CsvSource) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true);
    if let Some(delimiter) = source.delimiter {
        let mut buf = [0u8; 4];
        if delimiter.encode_utf8(&mut buf).len() == 1 {
            builder.delimiter(buf[0]);
        } else {
            log::warn!("ignoring multi-byte delimiter {:?}", delimiter);
        }
    }
    builder
}

/// Parse every non-empty cell as `f64`, or `None` if any cell is not numeric.
fn numeric_column(cells: &[String]) -> Option<Vec<Option<f64>>> {
    cells
        .iter()
        .map(|cell| {
            if cell.is_empty() {
                Some(None)
            } else {
                cell.parse::<f64>().ok().map(Some)
            }
        })
        .collect()
}

impl Adapter for CsvTimeIntervalsAdapter {
    fn name(&self) -> &str {
        "csv-time-intervals"
    }

    fn source_schema(&self) -> Schema {
        CsvSource::schema()
    }

    fn metadata_schema(&self) -> Schema {
        let table = ObjectSchema::new()
            .required("table_name", Schema::string())
            .optional("table_description", Schema::string());
        ObjectSchema::new()
            .optional(
                "TimeIntervals",
                ObjectSchema::new().optional(DEFAULT_TAG, table),
            )
            .into()
    }

    fn options_schema(&self) -> Schema {
        RunOptions::schema()
            .optional(
                "tag",
                Schema::string()
                    .with_default(DEFAULT_TAG)
                    .with_description("Key under TimeIntervals naming this table's metadata"),
            )
            .optional(
                "starting_time",
                Schema::number().with_description("Seconds added to every '*_time' column"),
            )
            .optional(
                "column_name_mapping",
                Schema::object().with_description("Source column name to output column name"),
            )
            .optional(
                "column_descriptions",
                Schema::object().with_description("Output column name to description"),
            )
            .into()
    }

    fn metadata(&self) -> MetadataTree {
        let mut metadata = MetadataTree::new();
        metadata.set_path(
            &format!("TimeIntervals.{DEFAULT_TAG}"),
            json!({
                "table_name": DEFAULT_TAG,
                "table_description": format!(
                    "experimental {} generated from {}",
                    DEFAULT_TAG,
                    self.source.file_path.display()
                ),
            }),
        );
        metadata
    }

    fn default_options(&self) -> Map<String, Value> {
        let mut defaults = RunOptions::default_map();
        defaults.insert("tag".into(), json!(DEFAULT_TAG));
        defaults
    }

    fn check_options(&self, options: &Map<String, Value>) -> Result<(), AdapterError> {
        parse_options::<IntervalOptions>(options).map(|_| ())
    }

    fn run_conversion(
        &mut self,
        ctx: &mut RunContext<'_>,
        metadata: &MetadataTree,
        options: &Map<String, Value>,
    ) -> Result<(), AdapterError> {
        let options: IntervalOptions = parse_options(options)?;
        let limit = options
            .common
            .stub_test
            .then_some(STUB_LEADING_EXTENT as usize);
        let columns = self.read_columns(limit)?;
        ctx.check_cancelled()?;

        let table_meta = metadata
            .get_path(&format!("TimeIntervals.{}", options.tag))
            .and_then(Value::as_object);
        let table_name = table_meta
            .and_then(|t| t.get("table_name"))
            .and_then(Value::as_str)
            .unwrap_or(&options.tag)
            .to_string();
        let description = table_meta
            .and_then(|t| t.get("table_description"))
            .and_then(Value::as_str)
            .unwrap_or("no description")
            .to_string();

        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
        let mut descriptions = Map::new();
        for (header, cells) in self.headers.iter().zip(&columns) {
            let name = options
                .column_name_mapping
                .get(header)
                .cloned()
                .unwrap_or_else(|| header.clone());
            match numeric_column(cells) {
                Some(mut values) => {
                    if let Some(offset) = options.starting_time.filter(|_| header.ends_with("_time")) {
                        values.iter_mut().flatten().for_each(|t| *t += offset);
                    }
                    fields.push(Field::new(&name, DataType::Float64, true));
                    arrays.push(Arc::new(Float64Array::from(values)));
                }
                None if REQUIRED_COLUMNS.contains(&header.as_str()) => {
                    return Err(AdapterError::InvalidData(format!(
                        "column '{}' must be numeric seconds",
                        header
                    )));
                }
                None => {
                    fields.push(Field::new(&name, DataType::Utf8, true));
                    let values: Vec<Option<&str>> = cells
                        .iter()
                        .map(|c| (!c.is_empty()).then_some(c.as_str()))
                        .collect();
                    arrays.push(Arc::new(StringArray::from(values)));
                }
            }
            if let Some(text) = options.column_descriptions.get(&name) {
                descriptions.insert(name, json!(text));
            }
        }

        let batch = RecordBatch::try_new(Arc::new(ArrowSchema::new(fields)), arrays)?;
        let mut attributes = Map::new();
        attributes.insert("description".into(), json!(description));
        attributes.insert(
            "source_file".into(),
            json!(self.source.file_path.display().to_string()),
        );
        if !descriptions.is_empty() {
            attributes.insert("column_descriptions".into(), Value::Object(descriptions));
        }

        ctx.store().write_table(
            &format!("intervals/{table_name}"),
            &[batch],
            options.common.compression,
            options.common.compression_level,
            &attributes,
        )?;
        Ok(())
    }
}
