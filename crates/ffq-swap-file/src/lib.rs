// SPDX-License-Identifier: Apache-2.0

//! Filesystem swap manager for flow file queues.
//!
//! Batches are written as CRC-protected CBOR files under a single swap
//! directory, one file per batch, named so that a lexicographic sort of the
//! file names reproduces persistence order. Files are written to a `.part`
//! temp name, fsynced and renamed into place, so a crash never leaves a
//! half-visible batch; leftover temp files are deleted during recovery.
//!
//! A restored batch is consumed: `swap_in` deletes the file after a successful
//! parse. Corruption is detected by the CRC trailer and reported as
//! [`SwapError::Corrupt`], leaving the policy decision to the queue.

use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use ffq_queue::SwapError;
use ffq_queue::flowfile::FlowFileRecord;
use ffq_queue::swap::{SwapLocation, SwapManager, SwapSummary};

mod format;

const SWAP_EXTENSION: &str = "swap";
const PART_EXTENSION: &str = "part";

/// Swap manager persisting batches as one file per batch.
pub struct FileSwapManager<R> {
    directory: PathBuf,
    sequence: AtomicU64,
    _record: PhantomData<fn() -> R>,
}

impl<R> FileSwapManager<R> {
    /// Creates a manager rooted at `directory`, creating it if needed.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, SwapError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            sequence: AtomicU64::new(0),
            _record: PhantomData,
        })
    }

    /// The swap directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File name prefix sorting in persistence order: zero-padded wall-clock
    /// millis, then a per-process sequence for same-millisecond batches.
    fn next_file_name(&self, queue_identifier: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64);
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel);
        format!(
            "{millis:020}-{sequence:08}-{:08x}-{}.{SWAP_EXTENSION}",
            queue_hash(queue_identifier),
            Uuid::new_v4().simple()
        )
    }
}

fn queue_hash(queue_identifier: &str) -> u32 {
    crc32fast::hash(queue_identifier.as_bytes())
}

fn open_error(location: &str, error: std::io::Error) -> SwapError {
    if error.kind() == std::io::ErrorKind::NotFound {
        SwapError::NotFound {
            location: location.to_string(),
        }
    } else {
        SwapError::Io { source: error }
    }
}

impl<R> SwapManager<R> for FileSwapManager<R>
where
    R: FlowFileRecord + Serialize + DeserializeOwned,
{
    fn swap_out(&self, records: &[R], queue_identifier: &str) -> Result<SwapLocation, SwapError> {
        let image = format::encode_batch(records, queue_identifier)?;
        let file_name = self.next_file_name(queue_identifier);
        let final_path = self.directory.join(&file_name);
        let temp_path = self.directory.join(format!("{file_name}.{PART_EXTENSION}"));

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&image)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &final_path)?;

        tracing::debug!(
            queue = queue_identifier,
            file = %final_path.display(),
            records = records.len(),
            "persisted swap batch"
        );
        Ok(SwapLocation::new(final_path.to_string_lossy().into_owned()))
    }

    fn swap_in(
        &self,
        location: &SwapLocation,
        queue_identifier: &str,
    ) -> Result<Vec<R>, SwapError> {
        let path = Path::new(location.as_str());
        let bytes = fs::read(path).map_err(|e| open_error(location.as_str(), e))?;
        let (_header, records) =
            format::decode_batch::<R>(&bytes, location.as_str(), queue_identifier)?;

        // The batch is consumed; a failed delete is not a failed swap-in.
        if let Err(error) = fs::remove_file(path) {
            tracing::warn!(
                file = %path.display(),
                error = %error,
                "failed to delete consumed swap file"
            );
        }

        tracing::debug!(
            queue = queue_identifier,
            file = %path.display(),
            records = records.len(),
            "restored swap batch"
        );
        Ok(records)
    }

    fn swap_summary(&self, location: &SwapLocation) -> Result<SwapSummary, SwapError> {
        let bytes =
            fs::read(location.as_str()).map_err(|e| open_error(location.as_str(), e))?;
        Ok(format::decode_header(&bytes, location.as_str())?.summary())
    }

    fn recover_swap_locations(
        &self,
        queue_identifier: &str,
    ) -> Result<Vec<SwapLocation>, SwapError> {
        let marker = format!("-{:08x}-", queue_hash(queue_identifier));
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&format!(".{PART_EXTENSION}")) {
                // An interrupted swap-out; the rename never happened.
                tracing::warn!(file = %name, "removing leftover partial swap file");
                if let Err(error) = fs::remove_file(entry.path()) {
                    tracing::warn!(file = %name, error = %error, "failed to remove partial swap file");
                }
                continue;
            }
            if name.ends_with(&format!(".{SWAP_EXTENSION}")) && name.contains(&marker) {
                names.push(name);
            }
        }
        names.sort_unstable();
        Ok(names
            .into_iter()
            .map(|name| {
                SwapLocation::new(self.directory.join(name).to_string_lossy().into_owned())
            })
            .collect())
    }

    fn purge(&self) {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    directory = %self.directory.display(),
                    error = %error,
                    "failed to list swap directory during purge"
                );
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&format!(".{SWAP_EXTENSION}"))
                || name.ends_with(&format!(".{PART_EXTENSION}"))
            {
                if let Err(error) = fs::remove_file(entry.path()) {
                    tracing::warn!(file = %name, error = %error, "failed to purge swap file");
                }
            }
        }
    }
}
