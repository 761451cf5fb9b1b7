use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use super::StoreError;

/// Element type of an array dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// Unsigned 8-bit integer
    Uint8,
    /// Unsigned 16-bit integer
    Uint16,
    /// Unsigned 32-bit integer
    Uint32,
    /// Unsigned 64-bit integer
    Uint64,
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
}

impl ElementType {
    /// Bytes per element.
    pub fn size(&self) -> usize {
        match self {
            ElementType::Uint8 | ElementType::Int8 => 1,
            ElementType::Uint16 | ElementType::Int16 => 2,
            ElementType::Uint32 | ElementType::Int32 | ElementType::Float32 => 4,
            ElementType::Uint64 | ElementType::Int64 | ElementType::Float64 => 8,
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Uint8 => "uint8",
            ElementType::Uint16 => "uint16",
            ElementType::Uint32 => "uint32",
            ElementType::Uint64 => "uint64",
            ElementType::Int8 => "int8",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "uint8" => ElementType::Uint8,
            "uint16" => ElementType::Uint16,
            "uint32" => ElementType::Uint32,
            "uint64" => ElementType::Uint64,
            "int8" => ElementType::Int8,
            "int16" => ElementType::Int16,
            "int32" => ElementType::Int32,
            "int64" => ElementType::Int64,
            "float32" => ElementType::Float32,
            "float64" => ElementType::Float64,
            other => return Err(StoreError::UnknownElementType(other.to_string())),
        })
    }
}

/// Compression codec for array chunks and tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Stored as-is
    None,
    /// Gzip (deflate)
    #[default]
    Gzip,
}

/// Default gzip level.
pub const DEFAULT_GZIP_LEVEL: u32 = 4;

impl Codec {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Gzip => "gzip",
        }
    }

    /// Encode one chunk payload.
    pub fn encode(&self, level: u32, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Codec::None => Ok(data.to_vec()),
            Codec::Gzip => {
                let mut encoder = GzEncoder::new(
                    Vec::with_capacity(data.len() / 2),
                    flate2::Compression::new(level.min(9)),
                );
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }

    /// Decode one chunk payload.
    pub fn decode(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Codec::None => Ok(data.to_vec()),
            Codec::Gzip => {
                let mut out = Vec::new();
                GzDecoder::new(data).read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "uncompressed" => Ok(Codec::None),
            "gzip" => Ok(Codec::Gzip),
            other => Err(format!("unknown codec '{other}', expected 'gzip' or 'none'")),
        }
    }
}

/// Kind of dataset held by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Chunked N-dimensional array
    Array,
    /// Parquet table
    Table,
}

/// One dataset listed in the store manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Slash-separated dataset path
    pub path: String,
    /// Dataset kind
    pub kind: DatasetKind,
}

/// Contents of `store.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    /// Store layout version
    pub format_version: String,
    /// RFC 3339 creation time
    pub created: String,
    /// Name and version of the writer
    pub generator: String,
    /// True once the store was finished cleanly
    #[serde(default)]
    pub finished: bool,
    /// Datasets in creation order
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

impl StoreManifest {
    pub(super) fn new() -> Self {
        Self {
            format_version: super::FORMAT_VERSION.to_string(),
            created: chrono::Utc::now().to_rfc3339(),
            generator: format!("confluence {}", env!("CARGO_PKG_VERSION")),
            finished: false,
            datasets: Vec::new(),
        }
    }
}

/// Contents of an array dataset's `array.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMeta {
    /// Declared shape
    pub shape: Vec<u64>,
    /// Physical chunk shape
    pub chunk_shape: Vec<u64>,
    /// Element type
    pub element_type: ElementType,
    /// Chunk codec
    pub codec: Codec,
    /// Codec level
    #[serde(default)]
    pub compression_level: u32,
    /// Free-form attributes
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// Elements written so far
    #[serde(default)]
    pub written_elements: u64,
    /// True once written volume equals declared volume
    #[serde(default)]
    pub complete: bool,
}

impl ArrayMeta {
    /// Total number of elements.
    pub fn volume(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Number of chunks along each dimension.
    pub fn chunk_grid(&self) -> Vec<u64> {
        self.shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&e, &c)| e.div_ceil(c))
            .collect()
    }

    /// Chunk file name for grid coordinates (`i.j.k`).
    pub fn chunk_key(coords: &[u64]) -> String {
        coords
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Offset and (boundary-clipped) extent of the chunk at `coords`.
    pub fn chunk_box(&self, coords: &[u64]) -> (Vec<u64>, Vec<u64>) {
        coords
            .iter()
            .zip(self.chunk_shape.iter().zip(&self.shape))
            .map(|(&i, (&c, &e))| {
                let start = i * c;
                (start, c.min(e - start))
            })
            .unzip()
    }
}
