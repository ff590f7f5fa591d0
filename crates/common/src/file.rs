//! Byte-addressable file abstraction (§2 "File adapter" row, §6.3).
//!
//! The host OS file primitives are, per spec.md, "external collaborators
//! whose interfaces are defined, not designed here" — but the component
//! table still budgets real line count for a thin adapter, so this module
//! defines the trait and ships the one implementation every caller actually
//! needs: a `std::fs::File`-backed adapter.

use crate::{DbError, DbResult};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A byte-addressable file the pager and WAL read and write pages through.
pub trait FileAdapter: Sized {
    /// Open (creating if necessary, unless `read_only`) the file at `path`.
    fn open(path: &Path, read_only: bool) -> DbResult<Self>;

    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> DbResult<()>;

    /// Write all of `buf` starting at `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> DbResult<()>;

    /// Flush and fsync the file to durable storage.
    fn sync(&mut self) -> DbResult<()>;

    /// Current size of the file in bytes.
    fn size(&self) -> DbResult<u64>;

    /// Grow or shrink the file to exactly `len` bytes.
    fn set_len(&mut self, len: u64) -> DbResult<()>;
}

/// Returns whether a path names an existing file.
pub fn path_exists(path: &Path) -> bool {
    path.exists()
}

/// Delete the file at `path`.
pub fn delete_file(path: &Path) -> DbResult<()> {
    fs::remove_file(path).map_err(Into::into)
}

/// `FileAdapter` backed by a native OS file handle.
#[derive(Debug)]
pub struct OsFile {
    file: File,
    read_only: bool,
}

impl FileAdapter for OsFile {
    fn open(path: &Path, read_only: bool) -> DbResult<Self> {
        let file = if read_only {
            OpenOptions::new().read(true).open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?
        };
        Ok(Self { file, read_only })
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> DbResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> DbResult<()> {
        if self.read_only {
            return Err(DbError::io_err("file opened read-only"));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn sync(&mut self) -> DbResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> DbResult<()> {
        if self.read_only {
            return Err(DbError::io_err("file opened read-only"));
        }
        self.file.set_len(len)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let mut f = OsFile::open(&path, false).unwrap();
        f.set_len(4096).unwrap();
        f.write_at(10, b"hello").unwrap();

        let mut buf = [0u8; 5];
        f.read_at(10, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn size_reflects_set_len() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let mut f = OsFile::open(&path, false).unwrap();
        f.set_len(8192).unwrap();
        assert_eq!(f.size().unwrap(), 8192);
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        {
            let mut f = OsFile::open(&path, false).unwrap();
            f.set_len(4096).unwrap();
        }
        let mut f = OsFile::open(&path, true).unwrap();
        assert!(f.write_at(0, b"x").is_err());
    }

    #[test]
    fn exists_and_delete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        assert!(!path_exists(&path));
        OsFile::open(&path, false).unwrap();
        assert!(path_exists(&path));
        delete_file(&path).unwrap();
        assert!(!path_exists(&path));
    }
}
