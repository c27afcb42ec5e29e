//! Boundary-tag block format.
//!
//! ```text
//!   ┌────────────┬────────────┬────────────┬───────────────────┬────────────┐
//!   │   header   │    next    │    prev    │   ... payload ... │   footer   │
//!   │  8 bytes   │  (free)    │  (free)    │                   │  8 bytes   │
//!   └────────────┴────────────┴────────────┴───────────────────┴────────────┘
//!   ▲            ▲
//!   block        payload returned to the caller
//!
//!   tag word (little-endian u64):
//!   ┌──────────────────┬──────────────────────────────┬──────────────────┐
//!   │ requested (16)   │ magic (32)                   │ size|alloc (16)  │
//!   └──────────────────┴──────────────────────────────┴──────────────────┘
//!    63             48  47                          16  15              0
//! ```

use crate::align::checked_align;

pub const HEADER_MAGIC: u32 = 0x0bad_bee5;
pub const FOOTER_MAGIC: u32 = 0xface_ba5e;

pub const ALIGNMENT: usize = 16;
pub const MIN_BLOCK_SIZE: usize = 32;

pub const HEADER_SIZE: usize = 8;
pub const FOOTER_SIZE: usize = 8;
pub const LINK_SIZE: usize = 8;

pub const PROLOGUE_SIZE: usize = HEADER_SIZE;
pub const EPILOGUE_SIZE: usize = FOOTER_SIZE;

/// Largest value either 16-bit field of a tag can hold.
pub const TAG_FIELD_MAX: usize = u16::MAX as usize;

const ALLOCATED_FLAG: u16 = 0x1;

const _: () = assert!(HEADER_SIZE + 2 * LINK_SIZE + FOOTER_SIZE <= MIN_BLOCK_SIZE);
const _: () = assert!(MIN_BLOCK_SIZE % ALIGNMENT == 0);

/// Which end of a block a tag sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
  Header,
  Footer,
}

impl TagKind {
  pub const fn magic(self) -> u32 {
    match self {
      TagKind::Header => HEADER_MAGIC,
      TagKind::Footer => FOOTER_MAGIC,
    }
  }
}

/// Decoded header or footer word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
  size: u16,
  magic: u32,
  requested: u16,
}

impl Tag {
  /// Tag of a free block spanning `block_size` bytes.
  pub fn free(
    kind: TagKind,
    block_size: usize,
  ) -> Self {
    Self {
      size: block_size as u16 & !ALLOCATED_FLAG,
      magic: kind.magic(),
      requested: 0,
    }
  }

  /// Tag of an allocated block holding a `requested`-byte request.
  pub fn allocated(
    kind: TagKind,
    block_size: usize,
    requested: usize,
  ) -> Self {
    Self {
      size: block_size as u16 | ALLOCATED_FLAG,
      magic: kind.magic(),
      requested: requested as u16,
    }
  }

  /// Zero-size, permanently allocated prologue/epilogue tag.
  pub fn sentinel(kind: TagKind) -> Self {
    Self {
      size: ALLOCATED_FLAG,
      magic: kind.magic(),
      requested: 0,
    }
  }

  pub fn decode(word: u64) -> Self {
    Self {
      size: word as u16,
      magic: (word >> 16) as u32,
      requested: (word >> 48) as u16,
    }
  }

  pub fn encode(self) -> u64 {
    u64::from(self.size) | (u64::from(self.magic) << 16) | (u64::from(self.requested) << 48)
  }

  /// Block size with the allocated flag cleared.
  pub fn block_size(self) -> usize {
    usize::from(self.size & !ALLOCATED_FLAG)
  }

  pub fn requested_size(self) -> usize {
    usize::from(self.requested)
  }

  pub fn magic(self) -> u32 {
    self.magic
  }

  pub fn flag_set(self) -> bool {
    self.size & ALLOCATED_FLAG != 0
  }

  /// A tag counts as allocated only with the flag set and a non-zero request.
  pub fn is_allocated(self) -> bool {
    self.flag_set() && self.requested != 0
  }

  /// A tag counts as free with the flag clear and no recorded request.
  pub fn is_free(self) -> bool {
    !self.flag_set() && self.requested == 0
  }

  pub fn has_magic(
    self,
    kind: TagKind,
  ) -> bool {
    self.magic == kind.magic()
  }

  /// Footer that mirrors this header.
  pub fn mirrored(self) -> Self {
    Self {
      magic: FOOTER_MAGIC,
      ..self
    }
  }

  /// Header and footer describe the same block.
  pub fn agrees_with(
    self,
    other: Tag,
  ) -> bool {
    self.size == other.size && self.requested == other.requested
  }
}

/// Handle to a block: byte offset of its header from the start of the heap.
///
/// Offset 0 always holds the prologue, so no real block ever has it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(pub(crate) usize);

impl Block {
  pub fn offset(self) -> usize {
    self.0
  }

  pub(crate) fn payload_offset(self) -> usize {
    self.0 + HEADER_SIZE
  }

  pub(crate) fn footer_offset(
    self,
    block_size: usize,
  ) -> usize {
    self.0 + block_size - FOOTER_SIZE
  }
}

/// Bytes a block must span to hold a `requested`-byte payload.
///
/// Returns `None` when the computation overflows.
pub fn actual_block_size(requested: usize) -> Option<usize> {
  if requested < ALIGNMENT {
    return Some(ALIGNMENT << 1);
  }

  checked_align(requested.checked_add(HEADER_SIZE + FOOTER_SIZE)?, ALIGNMENT)
}

/// Caller-usable bytes of a block of `block_size` bytes.
pub fn payload_capacity(block_size: usize) -> usize {
  block_size.saturating_sub(HEADER_SIZE + FOOTER_SIZE)
}
