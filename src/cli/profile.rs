//! Conversion profiles for common use cases.
//!
//! Profiles pick the dataset codec level and the streaming buffer budget so
//! users rarely need the individual options.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Map, Value};

use confluence::chunking::DEFAULT_BUFFER_BYTES;
use confluence::store::DEFAULT_GZIP_LEVEL;

/// Conversion profiles for common use cases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Profile {
    /// Prioritize speed over compression.
    ///
    /// - gzip level 1
    /// - 2 GiB streaming buffer
    Fast,

    /// Balance between speed and compression (default).
    ///
    /// - gzip level 4
    /// - 1 GiB streaming buffer
    #[default]
    Balanced,

    /// Maximum compression, slower conversion.
    ///
    /// - gzip level 9
    /// - 512 MiB streaming buffer
    MaxCompression,
}

impl Profile {
    /// Gzip level for this profile.
    pub fn compression_level(&self) -> u32 {
        match self {
            Profile::Fast => 1,
            Profile::Balanced => DEFAULT_GZIP_LEVEL,
            Profile::MaxCompression => 9,
        }
    }

    /// Streaming buffer budget in bytes.
    pub fn buffer_bytes(&self) -> u64 {
        match self {
            Profile::Fast => DEFAULT_BUFFER_BYTES * 2,
            Profile::Balanced => DEFAULT_BUFFER_BYTES,
            Profile::MaxCompression => DEFAULT_BUFFER_BYTES / 2,
        }
    }

    /// Run options implied by this profile.
    pub fn run_options(&self) -> Map<String, Value> {
        let mut options = Map::new();
        options.insert("compression".into(), json!("gzip"));
        options.insert("compression_level".into(), json!(self.compression_level()));
        options.insert("buffer_bytes".into(), json!(self.buffer_bytes()));
        options
    }

    /// Returns all available profile names.
    pub fn variants() -> &'static [&'static str] {
        &["fast", "balanced", "max-compression"]
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Fast => write!(f, "fast"),
            Profile::Balanced => write!(f, "balanced"),
            Profile::MaxCompression => write!(f, "max-compression"),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Profile::Fast),
            "balanced" | "default" => Ok(Profile::Balanced),
            "max-compression" | "max" => Ok(Profile::MaxCompression),
            _ => Err(format!(
                "Unknown profile '{}'. Valid options: {}",
                s,
                Profile::variants().join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let balanced = Profile::default();
        assert_eq!(balanced, Profile::Balanced);
        assert_eq!(balanced.compression_level(), 4);
        assert_eq!(balanced.buffer_bytes(), DEFAULT_BUFFER_BYTES);
        assert_eq!(balanced.run_options()["compression"], json!("gzip"));
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!(Profile::from_str("fast").unwrap(), Profile::Fast);
        assert_eq!(Profile::from_str("BALANCED").unwrap(), Profile::Balanced);
        assert_eq!(Profile::from_str("max").unwrap(), Profile::MaxCompression);
        assert!(Profile::from_str("ultra").is_err());
        assert_eq!(Profile::MaxCompression.to_string(), "max-compression");
    }
}
