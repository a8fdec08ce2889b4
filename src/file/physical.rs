//! Memory-mapped files.

use std::{fs, path::Path};

use memmap2::Mmap;

use super::Backend;
use crate::{Error, Result};

/// A read-only mapping of a file on disk
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Map the file at `path`
    ///
    /// # Errors
    /// Returns [`Error::Io`] naming `path` if it cannot be opened or mapped
    pub fn new(path: &Path) -> Result<Physical> {
        let io_error = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::open(path).map_err(io_error)?;
        // The mapping is only ever read; concurrent truncation by another process is not guarded
        let data = unsafe { Mmap::map(&file) }.map_err(io_error)?;
        Ok(Physical { data })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).ok_or(Error::OutOfBounds)?;
        self.data.get(offset..end).ok_or(Error::OutOfBounds)
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
