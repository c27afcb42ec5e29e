//! # tagalloc - A Boundary-Tag Next-Fit Allocator
//!
//! This crate provides a `malloc`/`free`/`realloc` style allocator over a heap
//! that grows one page at a time through an `sbrk`-like page provider.
//!
//! ## Overview
//!
//! Every block carries a header and a footer (boundary tags), so the allocator
//! can step to either physical neighbour of a block. Free blocks are threaded
//! into an address-ordered, doubly linked free list, and placement is
//! **next-fit**: each search resumes where the previous one stopped.
//!
//! ```text
//!   Heap after a few allocations:
//!
//!   ┌──────┬────────────┬────────────┬─────────────────────────┬──────┐
//!   │ pro- │ allocated  │    free    │        allocated        │ epi- │
//!   │ logue│  [h|data|f]│ [h|n|p|..f]│      [h|  data   |f]    │ logue│
//!   └──────┴────────────┴────────────┴─────────────────────────┴──────┘
//!                            ▲
//!             free list ─────┘   (head, cursor, address order)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macro (align!)
//!   ├── block      - Header/footer tag codec and block sizing
//!   ├── config     - HeapConfig (page size, page ceiling)
//!   ├── diag       - Free list dumps, block introspection, heap checker
//!   ├── error      - AllocError, ProviderError, ConfigError, HeapCorruption
//!   ├── freelist   - Address-ordered free list with next-fit cursor (internal)
//!   ├── heap       - Byte-addressed heap view and bounds oracle (internal)
//!   ├── nextfit    - NextFitAllocator
//!   └── provider   - PageProvider, MmapProvider, SbrkProvider
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{HeapConfig, NextFitAllocator};
//!
//! let mut allocator = NextFitAllocator::new(HeapConfig::default()).unwrap();
//!
//! let ptr = allocator.allocate(100).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0x2a, 100) };
//!
//! let ptr = allocator.resize(ptr.as_ptr(), 300).unwrap().unwrap();
//! assert_eq!(unsafe { *ptr.as_ptr().add(99) }, 0x2a);
//!
//! allocator.release(ptr.as_ptr()).unwrap();
//! assert_eq!(allocator.free_blocks().len(), 1);
//! ```
//!
//! ## How It Works
//!
//! The first allocation maps one page and lays it out as a prologue header,
//! one free block and an epilogue footer:
//!
//! ```text
//!   offset 0     8                                            4088   4096
//!   ┌────────────┬───────────────────────────────────────────┬──────┐
//!   │  prologue  │            free block, 4080 bytes         │ epi- │
//!   │ size 0|1   │                                           │ logue│
//!   └────────────┴───────────────────────────────────────────┴──────┘
//! ```
//!
//! `allocate(100)` needs `100 + 8 + 8` bytes rounded up to 16, i.e. 128. The
//! free block is split and the 3952-byte remainder stays on the free list:
//!
//! ```text
//!   ┌──────┬──────────────────┬─────────────────────────────────┬──────┐
//!   │ pro. │ 128, req 100     │         free, 3952              │ epi. │
//!   └──────┴──────────────────┴─────────────────────────────────┴──────┘
//!          ▲      ▲
//!          │      └── pointer returned to the caller (16-byte aligned)
//!          └── header
//! ```
//!
//! Releasing a block merges it with whichever physical neighbours are free,
//! so no two free blocks are ever adjacent. When no free block fits, the heap
//! grows a page at a time (up to the configured ceiling), extending the
//! trailing free block in place when there is one.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **Small heaps**: tag size fields are 16 bits wide, so a heap tops out
//!   below 64 KiB
//! - **No trimming**: pages are never handed back while the allocator lives
//!
//! ## Safety
//!
//! The public operations are safe to call with any pointer: a pointer is only
//! dereferenced after its header and footer offsets have been checked against
//! the mapped heap. Using the memory behind a returned pointer is of course
//! still `unsafe`.

pub mod align;
pub mod block;
pub mod config;
pub mod diag;
pub mod error;
mod freelist;
mod heap;
mod nextfit;
pub mod provider;

pub use config::HeapConfig;
pub use diag::{BlockInfo, FreeBlockInfo, FreeListDump, HeapStats};
pub use error::{AllocError, ConfigError, HeapCorruption, ProviderError};
pub use nextfit::NextFitAllocator;
pub use provider::{MmapProvider, PageProvider, SbrkProvider};
