//! Minimal in-memory adapters for unit tests.

use serde_json::{json, Map, Value};

use super::{parse_options, Adapter, AdapterError, RunContext, RunOptions};
use crate::chunking::{ChunkSlice, ChunkSource};
use crate::metadata::MetadataTree;
use crate::schema::{ObjectSchema, Schema};
use crate::store::ElementType;

/// Byte dataset whose element value is its row index modulo 256.
pub(crate) struct RampSource {
    pub shape: Vec<u64>,
}

impl ChunkSource for RampSource {
    fn element_size(&self) -> usize {
        1
    }

    fn shape(&self) -> &[u64] {
        &self.shape
    }

    fn read_chunk(&mut self, slice: &ChunkSlice, buf: &mut Vec<u8>) -> std::io::Result<()> {
        let row_len: u64 = slice.extent[1..].iter().product();
        for row in slice.offset[0]..slice.end(0) {
            buf.extend(std::iter::repeat((row % 256) as u8).take(row_len as usize));
        }
        Ok(())
    }
}

pub(crate) struct MockAdapter {
    pub source_key: &'static str,
    pub metadata: MetadataTree,
    pub rows: u64,
    pub fail: bool,
}

impl MockAdapter {
    pub fn new(source_key: &'static str, metadata: Value) -> Self {
        Self {
            source_key,
            metadata: MetadataTree::from_value(metadata).unwrap(),
            rows: 10,
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn source_schema(&self) -> Schema {
        ObjectSchema::new()
            .required(self.source_key, Schema::string())
            .closed()
            .into()
    }

    fn metadata_schema(&self) -> Schema {
        ObjectSchema::new()
            .optional("Mock", ObjectSchema::new().optional("rows", Schema::number()))
            .into()
    }

    fn options_schema(&self) -> Schema {
        RunOptions::schema().into()
    }

    fn metadata(&self) -> MetadataTree {
        self.metadata.clone()
    }

    fn default_options(&self) -> Map<String, Value> {
        RunOptions::default_map()
    }

    fn check_options(&self, options: &Map<String, Value>) -> Result<(), AdapterError> {
        parse_options::<RunOptions>(options).map(|_| ())
    }

    fn run_conversion(
        &mut self,
        ctx: &mut RunContext<'_>,
        _metadata: &MetadataTree,
        options: &Map<String, Value>,
    ) -> Result<(), AdapterError> {
        if self.fail {
            return Err(AdapterError::InvalidData("mock failure".into()));
        }
        let options: RunOptions = parse_options(options)?;
        let mut source = RampSource {
            shape: vec![self.rows, 2],
        };
        let path = format!("mock/{}", self.source_key);
        let mut attributes = Map::new();
        attributes.insert("rows".into(), json!(self.rows));
        ctx.write_array(&path, &mut source, ElementType::Uint8, &options, attributes)?;
        Ok(())
    }
}
