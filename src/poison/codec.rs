//! Padded-size arithmetic and the length header.

use crate::allocators::arena::{Arena, HeapPtr};
use crate::api::config::PoisonConfig;
use crate::error::PoisonError;

/// Width of the length header stored in front of every allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderWidth {
    /// 16-bit header; padded regions up to 64 KB.
    U16,
    /// 32-bit header.
    U32,
}

impl HeaderWidth {
    /// Header size in bytes.
    pub const fn size(self) -> usize {
        match self {
            HeaderWidth::U16 => 2,
            HeaderWidth::U32 => 4,
        }
    }

    /// Largest padded size the header can record.
    pub const fn max(self) -> usize {
        match self {
            HeaderWidth::U16 => u16::MAX as usize,
            HeaderWidth::U32 => u32::MAX as usize,
        }
    }
}

/// Guard geometry: header width, guard lengths and the sentinel byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardCodec {
    header: HeaderWidth,
    guard_before: usize,
    guard_after: usize,
    sentinel: u8,
}

impl GuardCodec {
    /// Build the codec for a configuration.
    pub fn new(config: &PoisonConfig) -> Self {
        Self {
            header: config.header,
            guard_before: config.guard_before,
            guard_after: config.guard_after,
            sentinel: config.sentinel,
        }
    }

    /// Length header size in bytes.
    pub fn header_size(&self) -> usize {
        self.header.size()
    }

    /// Leading guard length.
    pub fn guard_before(&self) -> usize {
        self.guard_before
    }

    /// Trailing guard length.
    pub fn guard_after(&self) -> usize {
        self.guard_after
    }

    /// Byte every guard is filled with.
    pub fn sentinel(&self) -> u8 {
        self.sentinel
    }

    /// Bytes added to every non-empty request.
    pub fn overhead(&self) -> usize {
        self.header
            .size()
            .saturating_add(self.guard_before)
            .saturating_add(self.guard_after)
    }

    /// Distance from the raw region start to the user pointer.
    pub fn user_offset(&self) -> usize {
        self.header.size().saturating_add(self.guard_before)
    }

    /// Padded size for a `payload`-byte request.
    ///
    /// Zero stays zero (no header, no guards). `None` when the sum
    /// overflows or does not fit the header width.
    pub fn padded_size(&self, payload: usize) -> Option<usize> {
        if payload == 0 {
            return Some(0);
        }
        payload
            .checked_add(self.overhead())
            .filter(|&padded| padded <= self.header.max())
    }

    /// Payload size recorded by a padded size.
    pub fn payload_size(&self, padded: usize) -> Option<usize> {
        padded.checked_sub(self.overhead())
    }

    /// Read the length header at `raw`.
    pub fn read_header(&self, arena: &Arena, raw: HeapPtr) -> Result<usize, PoisonError> {
        let bytes = arena.bytes(raw, self.header.size())?;
        Ok(match self.header {
            HeaderWidth::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as usize,
            HeaderWidth::U32 => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
        })
    }

    /// Write `padded` into the length header at `raw`.
    ///
    /// `padded` must come from [`padded_size`](Self::padded_size), which
    /// already bounds it by the header width.
    pub fn write_header(
        &self,
        arena: &mut Arena,
        raw: HeapPtr,
        padded: usize,
    ) -> Result<(), PoisonError> {
        let bytes = arena.bytes_mut(raw, self.header.size())?;
        match self.header {
            HeaderWidth::U16 => bytes.copy_from_slice(&(padded as u16).to_le_bytes()),
            HeaderWidth::U32 => bytes.copy_from_slice(&(padded as u32).to_le_bytes()),
        }
        Ok(())
    }
}
