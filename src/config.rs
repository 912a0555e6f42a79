//! Stream configuration passed explicitly to file-reading stages.
//!
//! Nothing in this crate consults the process locale or environment to decide
//! how to decode a file. Stages that open files take a [`StreamConfig`]
//! (or use [`StreamConfig::default`]), which can also be loaded from TOML:
//!
//! ```toml
//! encoding = "latin1"
//! buffer_capacity = 65536
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// How bytes read from a file are turned into `String` tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// Strict UTF-8; invalid data is an error at the offending line.
    #[default]
    Utf8,
    /// UTF-8 with invalid sequences replaced by U+FFFD.
    Utf8Lossy,
    /// ISO-8859-1, every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    /// Display name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Lossy => "utf-8 (lossy)",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    /// Decode one line of raw bytes. Returns `None` if the bytes are invalid
    /// for a strict encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            TextEncoding::Utf8Lossy => Some(String::from_utf8_lossy(bytes).into_owned()),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Settings threaded into stages that open files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub encoding: TextEncoding,
    /// Capacity of the read buffer wrapped around each opened file.
    pub buffer_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            buffer_capacity: 8 * 1024,
        }
    }
}

impl StreamConfig {
    /// Parse a configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the type system cannot.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(PipelineError::InvalidConfig {
                key: "buffer_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PipelineError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Builder-style override of the encoding.
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}
