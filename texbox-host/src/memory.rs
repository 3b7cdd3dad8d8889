//! Guest memory bridge
//!
//! Bounds-checked accessors over the guest's linear memory. The guest hands
//! the host raw offsets for filenames, print arguments and line buffers; every
//! access goes through [`GuestMemory`] so an out-of-range offset surfaces as a
//! [`MemoryError`] instead of a host panic.

use crate::config::{HostConfig, PAGE_SIZE};
use crate::error::MemoryError;

/// Mutable view of guest linear memory
pub struct GuestMemory<'a> {
    bytes: &'a mut [u8],
}

impl<'a> GuestMemory<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    /// Memory size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let out_of_bounds = MemoryError {
            offset,
            len,
            size: self.bytes.len(),
        };
        let end = offset.checked_add(len).ok_or_else(|| out_of_bounds.clone())?;
        if end > self.bytes.len() {
            return Err(out_of_bounds);
        }
        Ok(offset..end)
    }

    /// Borrow `len` bytes starting at `offset`
    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8], MemoryError> {
        let range = self.range(offset, len)?;
        Ok(&self.bytes[range])
    }

    /// Mutably borrow `len` bytes starting at `offset`
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], MemoryError> {
        let range = self.range(offset, len)?;
        Ok(&mut self.bytes[range])
    }

    /// Copy `data` into memory at `offset`
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        self.slice_mut(offset, data.len())?.copy_from_slice(data);
        Ok(())
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, MemoryError> {
        Ok(self.read(offset, 1)?[0])
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) -> Result<(), MemoryError> {
        self.write(offset, &[value])
    }

    /// Read a little-endian 32-bit word
    pub fn read_u32(&self, offset: usize) -> Result<u32, MemoryError> {
        let bytes = self.read(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Write a little-endian 32-bit word
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), MemoryError> {
        self.write(offset, &value.to_le_bytes())
    }

    /// Raw bytes of a length-prefixed string (first byte is the length)
    pub fn read_pascal_bytes(&self, offset: usize) -> Result<&[u8], MemoryError> {
        let len = self.read_u8(offset)? as usize;
        self.read(offset + 1, len)
    }

    /// Decode a length-prefixed string, one char per byte
    pub fn read_pascal_string(&self, offset: usize) -> Result<String, MemoryError> {
        Ok(latin1(self.read_pascal_bytes(offset)?))
    }

    /// Encode a length-prefixed string; content beyond 255 bytes is cut off
    pub fn write_pascal_string(&mut self, offset: usize, value: &[u8]) -> Result<(), MemoryError> {
        let len = value.len().min(u8::MAX as usize);
        self.write_u8(offset, len as u8)?;
        self.write(offset + 1, &value[..len])
    }
}

/// Decode bytes as ISO-8859-1
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Convert a guest pointer/length argument to a host offset
#[inline]
pub fn offset(value: i32) -> usize {
    value as u32 as usize
}

/// Location of the two control words the guest's unwind/rewind routines use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlBlock {
    /// Address of the continuation buffer header
    pub start: usize,

    /// High-water mark of the continuation buffer
    pub end: usize,
}

impl ControlBlock {
    pub fn from_config(config: &HostConfig) -> Self {
        let start = (config.memory_pages - config.continuation_pages) as usize * PAGE_SIZE;
        Self {
            start,
            end: config.memory_bytes(),
        }
    }

    /// Address passed to the guest's unwind/rewind entry points
    pub fn address(&self) -> i32 {
        self.start as i32
    }

    /// Initialize the header: buffer begins after the two words, ends at `end`
    pub fn prepare(&self, memory: &mut GuestMemory<'_>) -> Result<(), MemoryError> {
        memory.write_u32(self.start, (self.start + 8) as u32)?;
        memory.write_u32(self.start + 4, self.end as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_string_round_trip() {
        let mut bytes = vec![0u8; 64];
        let mut memory = GuestMemory::new(&mut bytes);
        memory.write_pascal_string(10, b"input.tex").unwrap();

        assert_eq!(memory.read_u8(10).unwrap(), 9);
        assert_eq!(memory.read_pascal_string(10).unwrap(), "input.tex");
    }

    #[test]
    fn test_latin1_decoding() {
        let mut bytes = vec![2u8, 0xE9, b'!'];
        let memory = GuestMemory::new(&mut bytes);
        assert_eq!(memory.read_pascal_string(0).unwrap(), "\u{e9}!");
    }

    #[test]
    fn test_out_of_bounds() {
        let mut bytes = vec![0u8; 16];
        let mut memory = GuestMemory::new(&mut bytes);

        let err = memory.read(12, 8).unwrap_err();
        assert_eq!(err, MemoryError { offset: 12, len: 8, size: 16 });
        assert!(memory.write_u32(14, 1).is_err());
        assert!(memory.read(usize::MAX, 2).is_err());

        // Declared length runs past the end
        memory.write_u8(15, 200).unwrap();
        assert!(memory.read_pascal_string(15).is_err());
    }

    #[test]
    fn test_control_block() {
        let config = HostConfig {
            memory_pages: 4,
            continuation_pages: 1,
            ..Default::default()
        };
        let block = ControlBlock::from_config(&config);
        assert_eq!(block.start, 3 * PAGE_SIZE);
        assert_eq!(block.end, 4 * PAGE_SIZE);

        let mut bytes = vec![0u8; block.end];
        let mut memory = GuestMemory::new(&mut bytes);
        block.prepare(&mut memory).unwrap();
        assert_eq!(memory.read_u32(block.start).unwrap(), (block.start + 8) as u32);
        assert_eq!(memory.read_u32(block.start + 4).unwrap(), block.end as u32);
    }

    #[test]
    fn test_negative_offsets_wrap_to_unsigned() {
        assert_eq!(offset(-1), u32::MAX as usize);
        assert_eq!(offset(42), 42);
    }
}
