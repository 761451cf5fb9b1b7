//! Interleaved int16 multi-channel recordings with a `key=value` `.meta`
//! sidecar, as written by SpikeGLX.
//!
//! The payload file is a flat sequence of frames; each frame holds one
//! little-endian `i16` sample per saved channel. Only the sidecar is read
//! when the adapter is opened; the payload is streamed in `run_conversion`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::adapter::{parse_options, Adapter, AdapterError, RunContext, RunOptions};
use crate::chunking::{ChunkSlice, ChunkSource};
use crate::metadata::{MetadataTree, ROOT_METADATA_KEY};
use crate::schema::{ObjectSchema, Schema};
use crate::store::ElementType;

use super::ttl::{EdgeDetector, TtlEdges, TtlSignal};

/// Bytes per sample.
const SAMPLE_BYTES: u64 = 2;

/// Read size while scanning a channel for TTL edges.
const TTL_BLOCK_BYTES: u64 = 8 * 1024 * 1024;

/// Which acquisition stream a recording file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// High-pass action-potential band (`.ap.bin`)
    ActionPotential,
    /// Low-pass local-field-potential band (`.lf.bin`)
    LocalFieldPotential,
    /// National Instruments auxiliary board (`.nidq.bin`)
    Nidq,
}

impl StreamKind {
    /// Detect the stream from the file name, falling back to `typeThis`.
    pub fn detect(path: &Path, meta: &HashMap<String, String>) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();
        if name.contains(".lf.") {
            StreamKind::LocalFieldPotential
        } else if name.contains(".nidq.") {
            StreamKind::Nidq
        } else if name.contains(".ap.") {
            StreamKind::ActionPotential
        } else if meta.get("typeThis").map(String::as_str) == Some("nidq") {
            StreamKind::Nidq
        } else {
            StreamKind::ActionPotential
        }
    }

    /// Metadata key of the series this stream is written as.
    pub fn series_key(&self) -> &'static str {
        match self {
            StreamKind::ActionPotential => "ElectricalSeriesRaw",
            StreamKind::LocalFieldPotential => "ElectricalSeriesLFP",
            StreamKind::Nidq => "ElectricalSeriesNIDQ",
        }
    }

    fn series_description(&self) -> &'static str {
        match self {
            StreamKind::ActionPotential => "Raw acquisition traces for the high-pass (ap) data.",
            StreamKind::LocalFieldPotential => "LFP traces for the low-pass (lf) data.",
            StreamKind::Nidq => "Raw acquisition traces for the auxiliary (nidq) board.",
        }
    }
}

/// Source locations of a binary recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinarySource {
    /// Path to the `.bin` payload
    pub file_path: PathBuf,
    /// Path to the `.meta` sidecar; derived from `file_path` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_path: Option<PathBuf>,
}

impl BinarySource {
    /// Source schema of this adapter kind.
    pub fn schema() -> Schema {
        ObjectSchema::new()
            .required(
                "file_path",
                Schema::string()
                    .with_format("file")
                    .with_description("Path to the interleaved int16 .bin file"),
            )
            .optional(
                "meta_path",
                Schema::string()
                    .with_format("file")
                    .with_description("Path to the .meta sidecar (default: alongside the .bin)"),
            )
            .closed()
            .into()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BinaryOptions {
    #[serde(flatten)]
    common: RunOptions,
    es_key: Option<String>,
    starting_time: Option<f64>,
}

/// Parse `key=value` lines of a `.meta` sidecar.
pub fn parse_meta(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Adapter for one interleaved int16 recording stream.
#[derive(Debug)]
pub struct BinaryRecordingAdapter {
    source: BinarySource,
    meta: HashMap<String, String>,
    stream: StreamKind,
    channels: u64,
    frames: u64,
    sampling_rate: f64,
}

impl BinaryRecordingAdapter {
    /// Read the sidecar and size the payload.
    pub fn open(source: BinarySource) -> Result<Self, AdapterError> {
        let meta_path = source
            .meta_path
            .clone()
            .unwrap_or_else(|| source.file_path.with_extension("meta"));
        let meta = parse_meta(&fs::read_to_string(&meta_path).map_err(|e| {
            AdapterError::InvalidSource(format!("cannot read {}: {}", meta_path.display(), e))
        })?);

        let channels: u64 = meta
            .get("nSavedChans")
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| AdapterError::InvalidData("missing or invalid nSavedChans".into()))?;
        let sampling_rate: f64 = meta
            .get("imSampRate")
            .or_else(|| meta.get("niSampRate"))
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AdapterError::InvalidData("missing imSampRate/niSampRate".into()))?;

        let size = fs::metadata(&source.file_path)
            .map_err(|e| {
                AdapterError::InvalidSource(format!("cannot stat {}: {}", source.file_path.display(), e))
            })?
            .len();
        let frame_bytes = channels * SAMPLE_BYTES;
        if size % frame_bytes != 0 {
            log::warn!(
                "{} has {} trailing bytes beyond the last full frame",
                source.file_path.display(),
                size % frame_bytes
            );
        }
        let frames = size / frame_bytes;
        let stream = StreamKind::detect(&source.file_path, &meta);
        log::debug!(
            "opened {} ({:?}): {} frames x {} channels at {} Hz",
            source.file_path.display(),
            stream,
            frames,
            channels,
            sampling_rate
        );

        Ok(Self {
            source,
            meta,
            stream,
            channels,
            frames,
            sampling_rate,
        })
    }

    /// Detected stream.
    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    /// `(frames, channels)`.
    pub fn shape(&self) -> [u64; 2] {
        [self.frames, self.channels]
    }

    /// Samples per second.
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Session start from `fileCreateTime`, if present and well-formed.
    pub fn session_start_time(&self) -> Option<NaiveDateTime> {
        let raw = self.meta.get("fileCreateTime")?;
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok()
    }

    /// TTL edges of one saved channel.
    ///
    /// The payload is scanned in blocks of whole frames; an analog trace
    /// without an explicit threshold takes one extra pass for its mean.
    pub fn ttl_edges(&self, channel: u64, signal: TtlSignal) -> Result<TtlEdges, AdapterError> {
        if channel >= self.channels {
            return Err(AdapterError::InvalidData(format!(
                "channel {} out of range ({} saved channels)",
                channel, self.channels
            )));
        }

        let threshold = match signal {
            TtlSignal::Analog {
                threshold: Some(threshold),
            } => threshold,
            TtlSignal::Analog { threshold: None } => {
                let mut sum = 0.0;
                self.scan_channel(channel, |sample| sum += f64::from(sample))?;
                sum / self.frames.max(1) as f64
            }
            TtlSignal::DigitalLine(line) if line < 16 => 0.5,
            TtlSignal::DigitalLine(line) => {
                return Err(AdapterError::InvalidData(format!(
                    "digital line {} out of range (0-15)",
                    line
                )))
            }
        };

        let mut detector = EdgeDetector::new(threshold);
        self.scan_channel(channel, |sample| {
            let value = match signal {
                TtlSignal::DigitalLine(line) => f64::from((sample as u16 >> line) & 1),
                TtlSignal::Analog { .. } => f64::from(sample),
            };
            detector.push([value]);
        })?;
        let edges = detector.finish();
        log::debug!(
            "channel {}: {} rising, {} falling edges",
            channel,
            edges.rising.len(),
            edges.falling.len()
        );
        Ok(edges)
    }

    /// Times in seconds of every TTL edge of `channel`, in order.
    pub fn ttl_event_times(&self, channel: u64, signal: TtlSignal) -> Result<Vec<f64>, AdapterError> {
        Ok(self.ttl_edges(channel, signal)?.times(self.sampling_rate, 0.0))
    }

    fn scan_channel<F: FnMut(i16)>(&self, channel: u64, mut visit: F) -> Result<(), AdapterError> {
        let mut source = InterleavedSource::open(&self.source.file_path, self.shape())?;
        let frame_bytes = (self.channels * SAMPLE_BYTES) as usize;
        let block = (TTL_BLOCK_BYTES / frame_bytes as u64).max(1);
        let at = (channel * SAMPLE_BYTES) as usize;
        let mut buf = Vec::new();

        let mut row = 0;
        while row < self.frames {
            let rows = block.min(self.frames - row);
            buf.clear();
            source.read_chunk(
                &ChunkSlice {
                    offset: vec![row, 0],
                    extent: vec![rows, self.channels],
                },
                &mut buf,
            )?;
            for frame in buf.chunks_exact(frame_bytes) {
                visit(i16::from_le_bytes([frame[at], frame[at + 1]]));
            }
            row += rows;
        }
        Ok(())
    }

    fn device(&self) -> Value {
        if self.stream == StreamKind::Nidq {
            let name = self
                .meta
                .get("niDev1ProductName")
                .cloned()
                .unwrap_or_else(|| "NIDQ".to_string());
            return json!({
                "name": name,
                "description": "National Instruments acquisition board",
                "manufacturer": "National Instruments",
            });
        }

        let mut details = Map::new();
        if let Some(probe_type) = self.meta.get("imDatPrb_type") {
            details.insert("probe_type".into(), json!(probe_type));
            let description = match probe_type.as_str() {
                "0" => Some("NP1.0"),
                "21" => Some("NP2.0(1-shank)"),
                "24" => Some("NP2.0(4-shank)"),
                _ => None,
            };
            if let Some(description) = description {
                details.insert("probe_type_description".into(), json!(description));
            }
        }
        if let Some(part) = self.meta.get("imDatFx_pn") {
            details.insert("flex_part_number".into(), json!(part));
        }
        if let Some(part) = self.meta.get("imDatBsc_pn") {
            details.insert("connected_base_station_part_number".into(), json!(part));
        }
        let description = if details.is_empty() {
            "no description".to_string()
        } else {
            Value::Object(details).to_string()
        };
        json!({
            "name": "Neuropixel-Imec",
            "description": description,
            "manufacturer": "Imec",
        })
    }
}

impl Adapter for BinaryRecordingAdapter {
    fn name(&self) -> &str {
        "binary-recording"
    }

    fn source_schema(&self) -> Schema {
        BinarySource::schema()
    }

    fn metadata_schema(&self) -> Schema {
        let series = ObjectSchema::new()
            .required("name", Schema::string())
            .optional("description", Schema::string());
        let ecephys = ObjectSchema::new()
            .optional(
                "Device",
                Schema::array_of(
                    ObjectSchema::new()
                        .required("name", Schema::string())
                        .optional("description", Schema::string())
                        .optional("manufacturer", Schema::string()),
                ),
            )
            .optional(
                "ElectrodeGroup",
                Schema::array_of(
                    ObjectSchema::new()
                        .required("name", Schema::string())
                        .optional("description", Schema::string())
                        .optional("location", Schema::string())
                        .optional("device", Schema::string()),
                ),
            )
            .optional(self.stream.series_key(), series);
        ObjectSchema::new().required("Ecephys", ecephys).into()
    }

    fn options_schema(&self) -> Schema {
        RunOptions::schema()
            .optional(
                "es_key",
                Schema::string().with_description("Metadata key of the series to write"),
            )
            .optional(
                "starting_time",
                Schema::number().with_description("Start of the series in seconds"),
            )
            .into()
    }

    fn metadata(&self) -> MetadataTree {
        let mut metadata = MetadataTree::new();
        if let Some(start) = self.session_start_time() {
            metadata.set_path(
                &format!("{ROOT_METADATA_KEY}.session_start_time"),
                start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            );
        }

        let device = self.device();
        let device_name = device["name"].clone();
        metadata.set_path("Ecephys.Device", json!([device]));
        metadata.set_path(
            "Ecephys.ElectrodeGroup",
            json!([{
                "name": "s0",
                "description": "a group representing shank s0",
                "location": "unknown",
                "device": device_name,
            }]),
        );
        let key = self.stream.series_key();
        metadata.set_path(
            &format!("Ecephys.{key}"),
            json!({"name": key, "description": self.stream.series_description()}),
        );
        metadata
    }

    fn default_options(&self) -> Map<String, Value> {
        RunOptions::default_map()
    }

    fn check_options(&self, options: &Map<String, Value>) -> Result<(), AdapterError> {
        parse_options::<BinaryOptions>(options).map(|_| ())
    }

    fn run_conversion(
        &mut self,
        ctx: &mut RunContext<'_>,
        metadata: &MetadataTree,
        options: &Map<String, Value>,
    ) -> Result<(), AdapterError> {
        let options: BinaryOptions = parse_options(options)?;
        if self.frames == 0 {
            return Err(AdapterError::InvalidData(format!(
                "{} holds no complete frames",
                self.source.file_path.display()
            )));
        }

        let key = options
            .es_key
            .as_deref()
            .unwrap_or(self.stream.series_key());
        let series = metadata
            .get_path(&format!("Ecephys.{key}"))
            .and_then(Value::as_object);
        let name = series
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(key)
            .to_string();
        let description = series
            .and_then(|s| s.get("description"))
            .and_then(Value::as_str)
            .unwrap_or("no description")
            .to_string();

        let mut attributes = Map::new();
        attributes.insert("rate".into(), json!(self.sampling_rate));
        attributes.insert("starting_time".into(), json!(options.starting_time.unwrap_or(0.0)));
        attributes.insert("description".into(), json!(description));
        attributes.insert("source_file".into(), json!(self.source.file_path.display().to_string()));

        let mut source = InterleavedSource::open(&self.source.file_path, self.shape())?;
        ctx.write_array(
            &format!("acquisition/{name}"),
            &mut source,
            ElementType::Int16,
            &options.common,
            attributes,
        )?;
        Ok(())
    }
}

/// Reads boxes of `(frames, channels)` from an interleaved int16 file.
pub(crate) struct InterleavedSource {
    file: File,
    shape: [u64; 2],
}

impl InterleavedSource {
    pub(crate) fn open(path: &Path, shape: [u64; 2]) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            shape,
        })
    }
}

impl ChunkSource for InterleavedSource {
    fn element_size(&self) -> usize {
        SAMPLE_BYTES as usize
    }

    fn shape(&self) -> &[u64] {
        &self.shape
    }

    fn read_chunk(&mut self, slice: &ChunkSlice, buf: &mut Vec<u8>) -> io::Result<()> {
        let channels = self.shape[1];
        let (row0, col0) = (slice.offset[0], slice.offset[1]);
        let (rows, cols) = (slice.extent[0], slice.extent[1]);
        let start = buf.len();

        if col0 == 0 && cols == channels {
            // Whole frames are contiguous on disk.
            buf.resize(start + (rows * channels * SAMPLE_BYTES) as usize, 0);
            self.file.seek(SeekFrom::Start(row0 * channels * SAMPLE_BYTES))?;
            self.file.read_exact(&mut buf[start..])?;
            return Ok(());
        }

        let run = (cols * SAMPLE_BYTES) as usize;
        buf.resize(start + rows as usize * run, 0);
        for (i, row) in (row0..row0 + rows).enumerate() {
            self.file
                .seek(SeekFrom::Start((row * channels + col0) * SAMPLE_BYTES))?;
            let at = start + i * run;
            self.file.read_exact(&mut buf[at..at + run])?;
        }
        Ok(())
    }
}
