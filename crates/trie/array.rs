//! The append-only, memory-mapped cell file.
//!
//! A context file is `CELL_SIZE × capacity` bytes, mapped read/write. Cell 0
//! holds the header; `length` counts committed cells (header included) and
//! only moves forward when a commit completes. Cells between `length` and
//! `capacity` are scratch space: commit writes there first and publishes
//! them by advancing the header length.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;

use crate::cell::CELL_SIZE;
use crate::error::TrieError;
use crate::node::CellIndex;

const MAGIC: [u8; 8] = *b"brmbl\0v1";
const VERSION: u32 = 1;

const OFF_VERSION: usize = 8;
const OFF_CELL_SIZE: usize = 12;
const OFF_LENGTH: usize = 16;

/// Smallest file we ever map: the header plus one leaf.
pub(crate) const MIN_CAPACITY: u64 = 4;

#[derive(Debug)]
pub(crate) struct CellArray {
    file: File,
    map: MmapMut,
    capacity: u64,
    length: u64,
}

impl CellArray {
    /// Creates a fresh array file of `capacity` cells with an empty header.
    pub(crate) fn create(path: &Path, capacity: u64) -> Result<Self, TrieError> {
        let capacity = capacity.max(MIN_CAPACITY);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(capacity * CELL_SIZE as u64)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        let mut array = CellArray {
            file,
            map,
            capacity,
            length: 1,
        };
        array.write_header();
        Ok(array)
    }

    /// Maps an existing array file, validating its header.
    pub(crate) fn open(path: &Path) -> Result<Self, TrieError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let bytes = file.metadata()?.len();
        if bytes < CELL_SIZE as u64 || bytes % CELL_SIZE as u64 != 0 {
            return Err(TrieError::InvalidFile(format!(
                "file size {bytes} is not a multiple of the cell size"
            )));
        }
        let capacity = bytes / CELL_SIZE as u64;
        let map = unsafe { MmapMut::map_mut(&file)? };

        let header = &map[..CELL_SIZE];
        if header[..8] != MAGIC {
            return Err(TrieError::InvalidFile("bad magic".into()));
        }
        let version = u32::from_le_bytes(header[OFF_VERSION..OFF_VERSION + 4].try_into().unwrap());
        if version != VERSION {
            return Err(TrieError::InvalidFile(format!(
                "unsupported version {version}"
            )));
        }
        let cell_size =
            u32::from_le_bytes(header[OFF_CELL_SIZE..OFF_CELL_SIZE + 4].try_into().unwrap());
        if cell_size as usize != CELL_SIZE {
            return Err(TrieError::InvalidFile(format!(
                "unsupported cell size {cell_size}"
            )));
        }
        let length = u64::from_le_bytes(header[OFF_LENGTH..OFF_LENGTH + 8].try_into().unwrap());
        if length == 0 || length > capacity {
            return Err(TrieError::InvalidFile(format!(
                "committed length {length} outside file of {capacity} cells"
            )));
        }

        Ok(CellArray {
            file,
            map,
            capacity,
            length,
        })
    }

    fn write_header(&mut self) {
        let header = &mut self.map[..CELL_SIZE];
        header.fill(0);
        header[..8].copy_from_slice(&MAGIC);
        header[OFF_VERSION..OFF_VERSION + 4].copy_from_slice(&VERSION.to_le_bytes());
        header[OFF_CELL_SIZE..OFF_CELL_SIZE + 4]
            .copy_from_slice(&(CELL_SIZE as u32).to_le_bytes());
        header[OFF_LENGTH..OFF_LENGTH + 8].copy_from_slice(&self.length.to_le_bytes());
    }

    /// Committed cells, header included.
    pub(crate) fn length(&self) -> u64 {
        self.length
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Free cells above the committed length.
    pub(crate) fn available(&self) -> u64 {
        self.capacity - self.length
    }

    pub(crate) fn cell(&self, index: CellIndex) -> &[u8] {
        assert!(index < self.capacity, "cell index {index} out of bounds");
        let offset = index as usize * CELL_SIZE;
        &self.map[offset..offset + CELL_SIZE]
    }

    pub(crate) fn cell_mut(&mut self, index: CellIndex) -> &mut [u8] {
        assert!(index < self.capacity, "cell index {index} out of bounds");
        let offset = index as usize * CELL_SIZE;
        &mut self.map[offset..offset + CELL_SIZE]
    }

    /// Publishes cells up to `length` by rewriting the header.
    pub(crate) fn set_length(&mut self, length: u64) {
        assert!(length >= self.length && length <= self.capacity);
        self.length = length;
        let header = &mut self.map[OFF_LENGTH..OFF_LENGTH + 8];
        header.copy_from_slice(&length.to_le_bytes());
    }

    /// Extends the file by `additional` cells and remaps it.
    pub(crate) fn grow(&mut self, additional: u64) -> Result<(), TrieError> {
        let capacity = self
            .capacity
            .checked_add(additional)
            .ok_or_else(|| TrieError::InvalidFile("capacity overflow".into()))?;
        self.resize(capacity)
    }

    /// Resizes the file to `capacity` cells and remaps it. The capacity
    /// never drops below the committed length.
    pub(crate) fn resize(&mut self, capacity: u64) -> Result<(), TrieError> {
        let capacity = capacity.max(self.length).max(MIN_CAPACITY);
        self.map.flush()?;
        self.file.set_len(capacity * CELL_SIZE as u64)?;
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        self.capacity = capacity;
        Ok(())
    }

    pub(crate) fn flush(&self) -> Result<(), TrieError> {
        self.map.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells");
        {
            let mut array = CellArray::create(&path, 32).unwrap();
            array.cell_mut(1)[0] = 0xAB;
            array.set_length(2);
            array.flush().unwrap();
        }
        let array = CellArray::open(&path).unwrap();
        assert_eq!(array.capacity(), 32);
        assert_eq!(array.length(), 2);
        assert_eq!(array.cell(1)[0], 0xAB);
    }

    #[test]
    fn grow_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells");
        let mut array = CellArray::create(&path, MIN_CAPACITY).unwrap();
        array.cell_mut(2)[7] = 0x17;
        array.set_length(3);
        array.grow(60).unwrap();
        assert_eq!(array.capacity(), MIN_CAPACITY + 60);
        assert_eq!(array.length(), 3);
        assert_eq!(array.cell(2)[7], 0x17);
    }

    #[test]
    fn open_rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells");
        std::fs::write(&path, vec![0u8; CELL_SIZE * 4]).unwrap();
        assert!(matches!(
            CellArray::open(&path),
            Err(TrieError::InvalidFile(_))
        ));
        std::fs::write(&path, b"short").unwrap();
        assert!(matches!(
            CellArray::open(&path),
            Err(TrieError::InvalidFile(_))
        ));
    }
}
