//! Concrete leaf adapters.
//!
//! - [`binary`] - interleaved int16 recordings with a `.meta` sidecar
//! - [`csv_intervals`] - delimited tables of time intervals
//! - [`ttl`] - edge detection on synchronization pulse channels
//!
//! [`AdapterKind`] is the closed set of adapters a conversion file can name.
//! Each kind exposes its source schema without opening anything, so source
//! locations can be validated before any file is touched.

pub mod binary;
pub mod csv_intervals;
pub mod ttl;

#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::adapter::{Adapter, AdapterError};
use crate::schema::Schema;

pub use binary::{BinaryRecordingAdapter, BinarySource, StreamKind};
pub use csv_intervals::{CsvSource, CsvTimeIntervalsAdapter};
pub use ttl::{TtlEdges, TtlSignal};

/// A constructible adapter kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// [`BinaryRecordingAdapter`]
    BinaryRecording,
    /// [`CsvTimeIntervalsAdapter`]
    CsvTimeIntervals,
}

impl AdapterKind {
    /// Every kind, in a stable order.
    pub const ALL: [AdapterKind; 2] = [AdapterKind::BinaryRecording, AdapterKind::CsvTimeIntervals];

    /// Name used in conversion files.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::BinaryRecording => "binary-recording",
            AdapterKind::CsvTimeIntervals => "csv-time-intervals",
        }
    }

    /// Source schema of this kind.
    pub fn source_schema(&self) -> Schema {
        match self {
            AdapterKind::BinaryRecording => BinarySource::schema(),
            AdapterKind::CsvTimeIntervals => CsvSource::schema(),
        }
    }

    /// Open an adapter of this kind on `source` (one label's source subtree).
    ///
    /// Only headers and sidecars are read.
    pub fn open(&self, source: &Value) -> Result<Box<dyn Adapter>, AdapterError> {
        let adapter: Box<dyn Adapter> = match self {
            AdapterKind::BinaryRecording => {
                Box::new(BinaryRecordingAdapter::open(parse_source(source)?)?)
            }
            AdapterKind::CsvTimeIntervals => {
                Box::new(CsvTimeIntervalsAdapter::open(parse_source(source)?)?)
            }
        };
        Ok(adapter)
    }
}

fn parse_source<T: serde::de::DeserializeOwned>(source: &Value) -> Result<T, AdapterError> {
    serde_json::from_value(source.clone())
        .map_err(|e| AdapterError::InvalidSource(e.to_string()))
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdapterKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| AdapterError::UnknownKind(s.to_string()))
    }
}
