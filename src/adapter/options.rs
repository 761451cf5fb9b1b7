use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::AdapterError;
use crate::chunking::{ChunkConfig, DEFAULT_BUFFER_BYTES, STUB_LEADING_EXTENT};
use crate::schema::{ObjectSchema, Schema};
use crate::store::{Codec, DEFAULT_GZIP_LEVEL};

/// Run options every leaf adapter recognises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Truncate the run to a small leading prefix
    pub stub_test: bool,
    /// Codec for written datasets
    pub compression: Codec,
    /// Codec level (0-9)
    pub compression_level: u32,
    /// Iteration buffer budget in bytes
    pub buffer_bytes: u64,
    /// Preferred physical chunk shape
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_shape: Option<Vec<u64>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stub_test: false,
            compression: Codec::Gzip,
            compression_level: DEFAULT_GZIP_LEVEL,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            chunk_shape: None,
        }
    }
}

impl RunOptions {
    /// Options schema declaring the common options, closed to anything else.
    pub fn schema() -> ObjectSchema {
        ObjectSchema::new()
            .optional(
                "stub_test",
                Schema::boolean()
                    .with_default(false)
                    .with_description("Write only a short leading prefix of every dataset"),
            )
            .optional(
                "compression",
                Schema::string()
                    .one_of(["gzip", "none"])
                    .with_default("gzip")
                    .with_description("Dataset codec: 'gzip' or 'none'"),
            )
            .optional(
                "compression_level",
                Schema::number()
                    .with_range(Some(0.0), Some(9.0))
                    .with_default(DEFAULT_GZIP_LEVEL)
                    .with_description("Codec level, 0-9"),
            )
            .optional(
                "buffer_bytes",
                Schema::number()
                    .with_range(Some(1.0), None)
                    .with_default(DEFAULT_BUFFER_BYTES)
                    .with_description("Maximum bytes held in memory while streaming an array"),
            )
            .optional(
                "chunk_shape",
                Schema::array_of(Schema::number().with_range(Some(1.0), None))
                    .with_description("Preferred physical chunk shape"),
            )
            .closed()
    }

    /// Default values as a JSON mapping.
    pub fn default_map() -> Map<String, Value> {
        match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Chunk configuration for a dataset of `shape` and `element_size`.
    pub fn chunk_config(&self, shape: Vec<u64>, element_size: usize) -> ChunkConfig {
        let mut config = ChunkConfig::new(shape, element_size).with_buffer_bytes(self.buffer_bytes);
        if let Some(chunk_shape) = &self.chunk_shape {
            config = config.with_chunk_shape(chunk_shape.clone());
        }
        if self.stub_test {
            config = config.with_stub(STUB_LEADING_EXTENT);
        }
        config
    }
}

/// Deserialise an options mapping into a typed options struct.
pub fn parse_options<T: DeserializeOwned>(options: &Map<String, Value>) -> Result<T, AdapterError> {
    serde_json::from_value(Value::Object(options.clone())).map_err(AdapterError::InvalidOptions)
}
