use thiserror::Error;

/// Failure reported by the public allocator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// Zero-size request, null pointer, or a pointer whose tags fail validation.
  #[error("invalid argument")]
  InvalidArgument,
  /// No block fits and the heap cannot grow, or the free list disagrees with
  /// the boundary tags.
  #[error("out of memory")]
  OutOfMemory,
}

impl AllocError {
  /// The `errno` value the C allocator interface uses for this failure.
  pub fn errno(self) -> i32 {
    match self {
      AllocError::InvalidArgument => libc::EINVAL,
      AllocError::OutOfMemory => libc::ENOMEM,
    }
  }
}

/// Failure of the page-acquisition primitive.
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("page reservation exhausted")]
  Exhausted,
  #[error("os: {0}")]
  Os(#[from] std::io::Error),
  #[error("new page at {got:#x} is not contiguous with heap end {expected:#x}")]
  Discontiguous { expected: usize, got: usize },
  #[error("heap start {addr:#x} is not aligned to {align}")]
  Misaligned { addr: usize, align: usize },
}

/// Rejected [`HeapConfig`](crate::HeapConfig) values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("page size {0} must be a multiple of 16 and at least 64")]
  PageSize(usize),
  #[error("max pages must be at least 1")]
  NoPages,
  #[error("heap of {pages} x {page_size} bytes does not fit the 16-bit size field")]
  TooLarge { pages: usize, page_size: usize },
}

/// First broken heap invariant found by
/// [`NextFitAllocator::check_heap`](crate::NextFitAllocator::check_heap).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapCorruption {
  #[error("block at {offset:#x}: bad {which} magic")]
  Magic { offset: usize, which: &'static str },
  #[error("block at {offset:#x}: header and footer disagree")]
  TagMismatch { offset: usize },
  #[error("block at {offset:#x}: size {size} is misaligned or below the minimum")]
  BadSize { offset: usize, size: usize },
  #[error("block at {offset:#x}: requested size does not match its free/allocated state")]
  BadRequested { offset: usize },
  #[error("blocks at {first:#x} and {second:#x} are both free")]
  Uncoalesced { first: usize, second: usize },
  #[error("block walk does not end on the epilogue (stopped at {offset:#x})")]
  Walk { offset: usize },
  #[error("sentinel at {offset:#x} is damaged")]
  Sentinel { offset: usize },
  #[error("free list is not strictly address-ordered at {offset:#x}")]
  Order { offset: usize },
  #[error("free list back link broken at {offset:#x}")]
  BackLink { offset: usize },
  #[error("free list member {offset:#x} is not a free block")]
  NotFree { offset: usize },
  #[error("free list holds {listed} blocks but the heap has {free} free blocks")]
  Unreachable { listed: usize, free: usize },
  #[error("next-fit cursor {offset:#x} is not a free list member")]
  Cursor { offset: usize },
}
