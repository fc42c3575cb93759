//! Stream ingestion of the dataset body.
//!
//! Accepts either one JSON array or newline-delimited JSON. Complete lines
//! are decoded as they arrive; whatever is left at end of stream is decoded
//! as a tail and merged. Lines that do not decode are skipped; the raw body
//! is kept so a caller can parse it whole when any were.

use futures_util::StreamExt;
use serde_json::Value;
use shelflife_core::{OversizeError, TransportError};
use thiserror::Error;
use tracing::{debug, trace};

use crate::remote::DatasetResponse;

/// Raw records decoded from a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub records: Vec<Value>,
    pub bytes_read: u64,
    pub skipped_lines: usize,
    /// The body as received.
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum IngestError {
    #[error(transparent)]
    Oversize(#[from] OversizeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The body arrived whole but no line decoded; `raw` holds it for a
    /// whole-body parse.
    #[error("No records decoded from {} bytes", .raw.len())]
    NoRecords { raw: Vec<u8> },
}

/// Bounded decoder for dataset bodies.
#[derive(Debug, Clone, Copy)]
pub struct StreamIngestor {
    max_bytes: u64,
}

impl StreamIngestor {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Consume `response`, failing as soon as the declared or observed size
    /// passes the ceiling.
    pub async fn ingest(&self, response: DatasetResponse) -> Result<Ingested, IngestError> {
        if let Some(declared) = response.content_length {
            if declared > self.max_bytes {
                return Err(OversizeError {
                    limit: self.max_bytes,
                    observed: declared,
                }
                .into());
            }
        }

        let mut body = response.body;
        let mut decoder = LineDecoder::default();
        let mut raw = Vec::new();
        let mut bytes_read: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| match e {
                TransportError::Body { reason, .. } => TransportError::Body {
                    received: bytes_read,
                    reason,
                },
                other => other,
            })?;

            bytes_read += chunk.len() as u64;
            if bytes_read > self.max_bytes {
                return Err(OversizeError {
                    limit: self.max_bytes,
                    observed: bytes_read,
                }
                .into());
            }

            trace!(chunk = chunk.len(), total = bytes_read, "ingesting chunk");
            raw.extend_from_slice(&chunk);
            decoder.push(&chunk);
        }

        let (records, skipped_lines) = decoder.finish();
        debug!(
            records = records.len(),
            skipped_lines, bytes_read, "stream ingestion finished"
        );

        if records.is_empty() {
            return Err(IngestError::NoRecords { raw });
        }
        Ok(Ingested {
            records,
            bytes_read,
            skipped_lines,
            raw,
        })
    }
}

#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
    records: Vec<Value>,
    skipped: usize,
}

impl LineDecoder {
    fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.decode_line(&line);
        }
    }

    fn finish(mut self) -> (Vec<Value>, usize) {
        let tail = std::mem::take(&mut self.buffer);
        self.decode_line(&tail);
        (self.records, self.skipped)
    }

    fn decode_line(&mut self, line: &[u8]) {
        let Ok(text) = std::str::from_utf8(line) else {
            self.skipped += 1;
            return;
        };
        let text = strip_separator(text.trim());
        if text.is_empty() || text == "[" || text == "]" {
            return;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => self.records.extend(items),
            Ok(object @ Value::Object(_)) => self.records.push(object),
            Ok(_) => self.skipped += 1,
            // First and last elements of a one-per-line array share their
            // line with the opening or closing bracket.
            Err(_) => match serde_json::from_str::<Value>(strip_brackets(text)) {
                Ok(object @ Value::Object(_)) => self.records.push(object),
                _ => self.skipped += 1,
            },
        }
    }
}

fn strip_separator(text: &str) -> &str {
    text.strip_suffix(',').unwrap_or(text).trim_end()
}

fn strip_brackets(text: &str) -> &str {
    let text = text.strip_prefix('[').unwrap_or(text).trim_start();
    let text = text.strip_suffix(']').unwrap_or(text).trim_end();
    strip_separator(text)
}
