//! CSV archiving functionality
//!
//! Archives are row-oriented CSV files of plain numeric rows under an
//! explicit header. Every row is flushed as soon as it is written so an
//! archive is well formed even if the executable stops abruptly.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::WriterBuilder;
pub use csv::Writer;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
pub struct Archiver {
    writer: Option<Writer<File>>,
    path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while archiving.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot create the archive file: {0}")]
    CreateError(std::io::Error),

    #[error("Cannot write to the archive: {0}")]
    WriteError(csv::Error),

    #[error("Cannot flush the archive: {0}")]
    FlushError(std::io::Error),

    #[error("The archive has already been closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create (or truncate) an archive file at the given path.
    ///
    /// Missing parent directories are created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(ArchiveError::CreateError)?;
        }

        let file = File::create(path.as_ref()).map_err(ArchiveError::CreateError)?;

        // Headers are written explicitly as the first row
        let w = WriterBuilder::new().has_headers(false).from_writer(file);

        Ok(Self {
            writer: Some(w),
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the archive can still be written to.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Write a row of plain string fields, for example a header.
    pub fn write_fields<I, S>(&mut self, fields: I) -> Result<(), ArchiveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let w = self.writer.as_mut().ok_or(ArchiveError::Closed)?;

        w.write_record(fields).map_err(ArchiveError::WriteError)?;
        w.flush().map_err(ArchiveError::FlushError)
    }

    /// Write a row of numeric values.
    pub fn write_values<I>(&mut self, values: I) -> Result<(), ArchiveError>
    where
        I: IntoIterator<Item = f64>,
    {
        self.write_fields(values.into_iter().map(|v| v.to_string()))
    }

    /// Flush and close the archive file.
    ///
    /// Closing an already closed archive does nothing.
    pub fn close(&mut self) -> Result<(), ArchiveError> {
        match self.writer.take() {
            Some(mut w) => w.flush().map_err(ArchiveError::FlushError),
            None => Ok(()),
        }
    }
}

impl Drop for Archiver {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close archive {:?}: {}", self.path, e);
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("samples.csv");

        let mut arch = Archiver::create(&path).unwrap();
        assert_eq!(arch.path(), path.as_path());

        arch.write_fields(&["time_s", "value"]).unwrap();
        arch.write_values(vec![0.0, 1.5]).unwrap();
        arch.write_values(vec![0.1, -2.0]).unwrap();

        // Rows are on disk before the archive is closed
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["time_s,value", "0,1.5", "0.1,-2"]);

        arch.close().unwrap();
    }

    #[test]
    fn test_write_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut arch = Archiver::create(dir.path().join("a.csv")).unwrap();

        arch.write_fields(&["a", "b"]).unwrap();
        arch.close().unwrap();
        arch.close().unwrap();

        assert!(!arch.is_open());
        match arch.write_values(vec![1.0, 2.0]) {
            Err(ArchiveError::Closed) => (),
            r => panic!("Expected closed error, got {:?}", r),
        }
    }
}
