//! Artifact codec
//!
//! Job inputs and uploads travel as `base64(gzip(bytes))` text. Decoding is
//! total: it yields the exact original bytes or a [`DecodeError`], never a
//! silently truncated buffer. Concatenated gzip members decode as one
//! stream; bytes after the last member that do not start another member are
//! an error.
//!
//! File names follow the coordinator's suffix convention: `system.xml.gz.b64`
//! decodes to `system.xml`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use thiserror::Error;

/// Errors raised while decoding an artifact
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64 encoding: {0}")]
    Encoding(String),

    #[error("corrupt gzip payload: {0}")]
    Compression(String),

    #[error("artifact '{name}': {source}")]
    Artifact {
        name: String,
        #[source]
        source: Box<DecodeError>,
    },
}

/// Decode a `base64(gzip(bytes))` blob
///
/// ASCII whitespace is ignored so line-wrapped base64 decodes unchanged.
///
/// # Example
/// ```
/// use grid_worker_core::artifacts::{decode, encode};
///
/// let blob = encode(b"hello");
/// assert_eq!(decode(&blob).unwrap(), b"hello");
/// ```
pub fn decode(blob: &str) -> Result<Vec<u8>, DecodeError> {
    gunzip(&decode_base64(blob)?)
}

/// Encode bytes as `base64(gzip(bytes))`
pub fn encode(bytes: &[u8]) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writes into a Vec cannot fail.
    let compressed = encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .unwrap_or_default();
    STANDARD.encode(compressed)
}

/// Decode a blob according to its file name suffixes
///
/// - `name.gz.b64` → base64 then gzip, name becomes `name`
/// - `name.b64` → base64 only, name becomes `name`
/// - anything else → base64 then gzip, name unchanged
pub fn decode_named(name: &str, blob: &str) -> Result<(String, Vec<u8>), DecodeError> {
    let wrap = |source: DecodeError| DecodeError::Artifact {
        name: name.to_string(),
        source: Box::new(source),
    };

    if let Some(stem) = name.strip_suffix(".gz.b64") {
        return Ok((stem.to_string(), decode(blob).map_err(wrap)?));
    }
    if let Some(stem) = name.strip_suffix(".b64") {
        return Ok((stem.to_string(), decode_base64(blob).map_err(wrap)?));
    }
    Ok((name.to_string(), decode(blob).map_err(wrap)?))
}

/// Decoded artifacts keyed by their decoded file name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    files: BTreeMap<String, Vec<u8>>,
}

impl ArtifactSet {
    /// Decode every blob in `blobs`, failing on the first bad artifact
    pub fn decode_all<'a, I>(blobs: I) -> Result<Self, DecodeError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut files = BTreeMap::new();
        for (name, blob) in blobs {
            let (decoded_name, bytes) = decode_named(name, blob)?;
            files.insert(decoded_name, bytes);
        }
        Ok(Self { files })
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Remove and return a decoded file
    pub fn take(&mut self, name: &str) -> Option<Vec<u8>> {
        self.files.remove(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

/// Descriptor file names of the engine inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactNames {
    /// Looked up in `target_files`
    pub system: String,
    /// Looked up in `target_files`
    pub integrator: String,
    /// Looked up in `stream_files`; checkpoints are uploaded under this name
    pub state: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            system: "system.xml.gz.b64".to_string(),
            integrator: "integrator.xml.gz.b64".to_string(),
            state: "state.xml.gz.b64".to_string(),
        }
    }
}

/// Name a blob decodes to under [`decode_named`]
pub fn decoded_name(name: &str) -> &str {
    name.strip_suffix(".gz.b64")
        .or_else(|| name.strip_suffix(".b64"))
        .unwrap_or(name)
}

fn decode_base64(blob: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = blob.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::Encoding(e.to_string()))
}

fn gunzip(compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = MultiGzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Compression(e.to_string()))?;
    let trailing = decoder.into_inner().len();
    if trailing > 0 {
        return Err(DecodeError::Compression(format!(
            "{} trailing bytes after gzip stream",
            trailing
        )));
    }
    Ok(out)
}
