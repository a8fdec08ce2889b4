//! In-memory resource content.

use super::Backend;
use crate::{Error::OutOfBounds, Result};

/// Bytes owned by the loader, e.g. handed over by a [`crate::loader::MemoryResolver`]
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).ok_or(OutOfBounds)?;
        self.data.get(offset..end).ok_or(OutOfBounds)
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_are_bounds_checked() {
        let mut data = vec![0xCC_u8; 64];
        data[10..15].fill(0xBB);
        let memory = Memory::new(data);

        assert_eq!(memory.len(), 64);
        assert_eq!(memory.data_slice(10, 5).unwrap(), &[0xBB; 5]);
        assert_eq!(memory.data_slice(64, 0).unwrap(), &[] as &[u8]);
        assert!(matches!(memory.data_slice(60, 5), Err(OutOfBounds)));
        assert!(matches!(memory.data_slice(usize::MAX, 1), Err(OutOfBounds)));
    }
}
