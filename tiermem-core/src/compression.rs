//! Payload compression.
//!
//! Payloads are serialized as JSON when they have a JSON form and as
//! bincode otherwise. Serialized payloads at or above `min_size` bytes are
//! zlib-compressed; anything that is not plain JSON text is base64 encoded,
//! so an [`Envelope`] is always safe to embed in a JSON item file.

use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Compressor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Deflate level, 0-9 (default: 6)
    pub level: u32,

    /// Serialized payloads smaller than this are stored raw (default: 1024 bytes)
    pub min_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: 6,
            min_size: 1024, // 1 KiB
        }
    }
}

/// How the payload bytes inside an envelope were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Json,
    Binary,
}

/// Self-describing wrapper for a stored payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub compressed: bool,
    #[serde(default)]
    pub encoding: Encoding,
    pub data: String,
    pub original_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Whether a stored payload has the shape of an envelope.
    pub fn is_envelope(value: &Value) -> bool {
        matches!(value.get("compressed"), Some(Value::Bool(_)))
            && matches!(value.get("data"), Some(Value::Str(_)))
    }

    /// Convert to the mapping payload it is stored as.
    pub fn to_value(&self) -> Result<Value> {
        Ok(Value::from(serde_json::to_value(self)?))
    }

    /// Parse an envelope back out of a stored payload.
    pub fn from_value(value: &Value) -> Result<Self> {
        let json = value
            .to_json()
            .ok_or_else(|| Error::decode("envelope is not a text payload"))?;
        serde_json::from_value(json).map_err(|e| Error::decode(e.to_string()))
    }
}

/// Serializes and conditionally compresses payloads.
#[derive(Debug, Clone, Default)]
pub struct Compressor {
    config: CompressionConfig,
}

impl Compressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Wrap a payload in an envelope, compressing it when it is large enough.
    pub fn compress(&self, payload: &Value) -> Result<Envelope> {
        let (encoding, serialized) = Self::serialize(payload)?;
        let original_size = serialized.len();
        let timestamp = Utc::now();

        if original_size < self.config.min_size {
            let data = match encoding {
                Encoding::Json => String::from_utf8(serialized)
                    .map_err(|e| Error::Compression(e.to_string()))?,
                Encoding::Binary => STANDARD.encode(&serialized),
            };
            return Ok(Envelope {
                compressed: false,
                encoding,
                data,
                original_size,
                compressed_size: None,
                timestamp,
            });
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.config.level.min(9)));
        encoder
            .write_all(&serialized)
            .map_err(|e| Error::Compression(e.to_string()))?;
        let compressed = encoder.finish().map_err(|e| Error::Compression(e.to_string()))?;

        Ok(Envelope {
            compressed: true,
            encoding,
            data: STANDARD.encode(&compressed),
            original_size,
            compressed_size: Some(compressed.len()),
            timestamp,
        })
    }

    /// Reverse [`Compressor::compress`].
    pub fn decompress(&self, envelope: &Envelope) -> Result<Value> {
        let bytes = if envelope.compressed {
            let raw = STANDARD
                .decode(envelope.data.as_bytes())
                .map_err(|e| Error::decode(format!("invalid base64: {}", e)))?;
            let mut inflated = Vec::with_capacity(envelope.original_size);
            ZlibDecoder::new(raw.as_slice())
                .read_to_end(&mut inflated)
                .map_err(|e| Error::decode(format!("invalid deflate stream: {}", e)))?;
            inflated
        } else {
            match envelope.encoding {
                Encoding::Json => envelope.data.as_bytes().to_vec(),
                Encoding::Binary => STANDARD
                    .decode(envelope.data.as_bytes())
                    .map_err(|e| Error::decode(format!("invalid base64: {}", e)))?,
            }
        };

        if bytes.len() != envelope.original_size {
            return Err(Error::decode(format!(
                "size mismatch: envelope records {} bytes, found {}",
                envelope.original_size,
                bytes.len()
            )));
        }

        Self::deserialize(envelope.encoding, &bytes)
    }

    fn serialize(payload: &Value) -> Result<(Encoding, Vec<u8>)> {
        if let Some(json) = payload.to_json() {
            if let Ok(bytes) = serde_json::to_vec(&json) {
                return Ok((Encoding::Json, bytes));
            }
        }

        bincode::serde::encode_to_vec(payload, bincode::config::standard())
            .map(|bytes| (Encoding::Binary, bytes))
            .map_err(|e| Error::Compression(format!("no encoding can represent payload: {}", e)))
    }

    fn deserialize(encoding: Encoding, bytes: &[u8]) -> Result<Value> {
        match encoding {
            Encoding::Json => serde_json::from_slice::<serde_json::Value>(bytes)
                .map(Value::from)
                .map_err(|e| Error::decode(format!("invalid JSON payload: {}", e))),
            Encoding::Binary => {
                let (value, read) = bincode::serde::decode_from_slice::<Value, _>(
                    bytes,
                    bincode::config::standard(),
                )
                .map_err(|e| Error::decode(format!("invalid binary payload: {}", e)))?;
                if read != bytes.len() {
                    return Err(Error::decode("trailing bytes after binary payload"));
                }
                Ok(value)
            }
        }
    }
}
