// SPDX-License-Identifier: Apache-2.0

//! On-disk layout of a swap file.
//!
//! ```text
//! ┌──────────┬───────────────┬────────────────┬───────────┐
//! │ magic 8B │ header (CBOR) │ records (CBOR) │ crc32 4B  │
//! └──────────┴───────────────┴────────────────┴───────────┘
//! ```
//!
//! The header repeats the batch summary so it can be read without touching the
//! record section. The CRC covers everything between the magic and the
//! trailer and is verified before any record is deserialized.

use std::io::Cursor;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ffq_queue::SwapError;
use ffq_queue::flowfile::FlowFileRecord;
use ffq_queue::swap::SwapSummary;

/// File magic; the trailing digit is the format version.
pub(crate) const MAGIC: &[u8; 8] = b"FFQSWAP1";

/// Minimum plausible file size: magic plus CRC trailer.
const MIN_FILE_LEN: usize = MAGIC.len() + 4;

/// Self-describing header of a swap file.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FileHeader {
    pub queue_identifier: String,
    pub record_count: u64,
    pub record_bytes: u64,
    pub max_record_id: Option<u64>,
}

impl FileHeader {
    pub(crate) fn summary(&self) -> SwapSummary {
        SwapSummary {
            record_count: self.record_count,
            record_bytes: self.record_bytes,
            max_record_id: self.max_record_id,
        }
    }
}

fn corrupt(location: &str, details: impl std::fmt::Display) -> SwapError {
    SwapError::Corrupt {
        location: location.to_string(),
        details: details.to_string(),
    }
}

/// Serializes a batch into the full file image, CRC included.
pub(crate) fn encode_batch<R>(records: &[R], queue_identifier: &str) -> Result<Vec<u8>, SwapError>
where
    R: FlowFileRecord + Serialize,
{
    let header = FileHeader {
        queue_identifier: queue_identifier.to_string(),
        record_count: records.len() as u64,
        record_bytes: records.iter().map(FlowFileRecord::size).sum(),
        max_record_id: records.iter().map(FlowFileRecord::id).max(),
    };

    let mut image = Vec::with_capacity(64 + records.len() * 64);
    image.extend_from_slice(MAGIC);
    ciborium::ser::into_writer(&header, &mut image)
        .map_err(|e| SwapError::Io {
            source: std::io::Error::other(e),
        })?;
    ciborium::ser::into_writer(&records, &mut image)
        .map_err(|e| SwapError::Io {
            source: std::io::Error::other(e),
        })?;

    let crc = crc32fast::hash(&image[MAGIC.len()..]);
    image.extend_from_slice(&crc.to_le_bytes());
    Ok(image)
}

/// Verifies and decodes a full file image.
pub(crate) fn decode_batch<R>(
    bytes: &[u8],
    location: &str,
    queue_identifier: &str,
) -> Result<(FileHeader, Vec<R>), SwapError>
where
    R: DeserializeOwned,
{
    let payload = checked_payload(bytes, location)?;

    let crc_offset = bytes.len() - 4;
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&bytes[crc_offset..]);
    if crc32fast::hash(payload) != u32::from_le_bytes(stored) {
        return Err(corrupt(location, "checksum mismatch"));
    }

    let mut cursor = Cursor::new(payload);
    let header: FileHeader =
        ciborium::de::from_reader(&mut cursor).map_err(|e| corrupt(location, e))?;
    if header.queue_identifier != queue_identifier {
        return Err(corrupt(
            location,
            format!("file belongs to queue `{}`", header.queue_identifier),
        ));
    }
    let records: Vec<R> =
        ciborium::de::from_reader(&mut cursor).map_err(|e| corrupt(location, e))?;
    if records.len() as u64 != header.record_count {
        return Err(corrupt(
            location,
            format!(
                "header claims {} records, file holds {}",
                header.record_count,
                records.len()
            ),
        ));
    }
    Ok((header, records))
}

/// Decodes only the header of a full file image. The CRC is not verified; a
/// torn header fails CBOR decoding and the record section is untouched.
pub(crate) fn decode_header(bytes: &[u8], location: &str) -> Result<FileHeader, SwapError> {
    let payload = checked_payload(bytes, location)?;
    let mut cursor = Cursor::new(payload);
    ciborium::de::from_reader(&mut cursor).map_err(|e| corrupt(location, e))
}

fn checked_payload<'a>(bytes: &'a [u8], location: &str) -> Result<&'a [u8], SwapError> {
    if bytes.len() < MIN_FILE_LEN {
        return Err(corrupt(location, "file is truncated"));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt(location, "bad magic"));
    }
    Ok(&bytes[MAGIC.len()..bytes.len() - 4])
}
