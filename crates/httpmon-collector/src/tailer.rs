use crate::error::{CollectorError, Result};
use std::fs::{File, Metadata};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Follows a growing file and hands back complete lines.
///
/// The file is reopened on every poll. A different file behind the path
/// (rotation by rename, on unix) or a file that shrank is read again from
/// the start. A trailing line without its newline stays buffered until the
/// rest arrives.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    offset: Option<u64>,
    identity: Option<FileIdentity>,
    read_from_start: bool,
    pending: Vec<u8>,
}

/// Device and inode of the file last read.
type FileIdentity = (u64, u64);

#[cfg(unix)]
fn file_identity(meta: &Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &Metadata) -> Option<FileIdentity> {
    None
}

impl LogTailer {
    /// With `read_from_start` unset, lines already in the file when it is
    /// first opened are skipped.
    pub fn new(path: impl Into<PathBuf>, read_from_start: bool) -> Self {
        Self {
            path: path.into(),
            offset: None,
            identity: None,
            read_from_start,
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far, or `None` before the file was first opened.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    fn io_error(&self, source: std::io::Error) -> CollectorError {
        CollectorError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    pub fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                // Anything written once the file shows up is new.
                if e.kind() == std::io::ErrorKind::NotFound && self.offset.is_none() {
                    self.read_from_start = true;
                }
                return Err(self.io_error(e));
            }
        };
        let meta = file.metadata().map_err(|e| self.io_error(e))?;
        let len = meta.len();
        let identity = file_identity(&meta);
        let replaced = self.offset.is_some() && identity != self.identity;
        self.identity = identity;

        let start = match self.offset {
            None if self.read_from_start => 0,
            None => len,
            Some(_) if replaced => {
                tracing::info!(
                    path = %self.path.display(),
                    "Log file replaced, reading from start"
                );
                self.pending.clear();
                0
            }
            Some(offset) if len < offset => {
                tracing::info!(
                    path = %self.path.display(),
                    previous = offset,
                    current = len,
                    "Log file shrank, reading from start"
                );
                self.pending.clear();
                0
            }
            Some(offset) => offset,
        };

        if start == len {
            self.offset = Some(start);
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(start))
            .map_err(|e| self.io_error(e))?;
        let mut chunk = Vec::new();
        let read = file
            .take(len - start)
            .read_to_end(&mut chunk)
            .map_err(|e| self.io_error(e))?;
        self.offset = Some(start + read as u64);
        self.pending.extend_from_slice(&chunk);

        Ok(self.drain_complete_lines())
    }

    fn drain_complete_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut line_start = 0;
        for (i, byte) in self.pending.iter().enumerate() {
            if *byte == b'\n' {
                let raw = String::from_utf8_lossy(&self.pending[line_start..i]);
                let line = raw.trim_end_matches('\r');
                if !line.trim().is_empty() {
                    lines.push(line.to_string());
                }
                line_start = i + 1;
            }
        }
        self.pending.drain(..line_start);
        lines
    }
}
