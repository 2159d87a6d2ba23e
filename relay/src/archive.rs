//! Attachment archive extraction.
//!
//! Looker delivers dashboard downloads as a base64-encoded zip. An
//! [`Attachment`] decodes and opens that zip, exposes the entry names in
//! archive order and reads an entry's content only when asked. Reads are
//! bounded by an entry-count cap and a total decompressed-bytes budget.

use std::io::{Cursor, Read};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;
use zip::ZipArchive;

/// Upper bound on the buffer reserved up front for one entry.
const INITIAL_READ_CAPACITY: u64 = 64 * 1024;

/// Bounds applied to one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_entries: usize,
    pub max_total_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            max_total_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Extraction failures.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("attachment data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("attachment is not a valid zip archive: {0}")]
    Format(#[from] zip::result::ZipError),

    #[error("could not read archive entry {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("archive has {count} entries, limit is {limit}")]
    TooManyEntries { count: usize, limit: usize },

    #[error("archive content exceeds {limit} decompressed bytes")]
    TooLarge { limit: u64 },
}

/// A decoded zip attachment.
pub struct Attachment {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    remaining_bytes: u64,
    limit: u64,
}

impl Attachment {
    /// Decode `data` from base64 and open it as a zip archive.
    pub fn decode(data: &str, limits: ArchiveLimits) -> Result<Self, ArchiveError> {
        let raw = STANDARD.decode(data)?;
        let archive = ZipArchive::new(Cursor::new(raw))?;

        if archive.len() > limits.max_entries {
            return Err(ArchiveError::TooManyEntries {
                count: archive.len(),
                limit: limits.max_entries,
            });
        }

        debug!(entries = archive.len(), "attachment_opened");

        Ok(Self {
            archive,
            remaining_bytes: limits.max_total_bytes,
            limit: limits.max_total_bytes,
        })
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Entry names paired with their index, in archive order.
    pub fn entries(&mut self) -> Result<Vec<(usize, String)>, ArchiveError> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(index)?;
            if entry.is_dir() {
                continue;
            }
            entries.push((index, entry.name().to_string()));
        }
        Ok(entries)
    }

    /// Read the full decompressed content of the entry at `index`.
    ///
    /// The bytes count against the attachment's total budget. An entry whose
    /// declared size already exceeds what is left is rejected before reading.
    pub fn read(&mut self, index: usize) -> Result<Vec<u8>, ArchiveError> {
        let limit = self.limit;
        let entry = self.archive.by_index(index)?;
        let name = entry.name().to_string();

        if entry.size() > self.remaining_bytes {
            return Err(ArchiveError::TooLarge { limit });
        }

        let mut content = Vec::with_capacity(initial_capacity(entry.size()));
        entry
            .take(self.remaining_bytes.saturating_add(1))
            .read_to_end(&mut content)
            .map_err(|source| ArchiveError::Read {
                name: name.clone(),
                source,
            })?;

        let read = content.len() as u64;
        if read > self.remaining_bytes {
            return Err(ArchiveError::TooLarge { limit });
        }
        self.remaining_bytes -= read;

        debug!(entry = %name, size = read, "attachment_entry_read");

        Ok(content)
    }
}

/// Declared entry sizes come from the archive and only hint the allocation.
fn initial_capacity(declared: u64) -> usize {
    declared.min(INITIAL_READ_CAPACITY) as usize
}
