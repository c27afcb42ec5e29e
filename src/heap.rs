//! Byte-addressed view of the mapped heap.
//!
//! Every read or write of heap memory goes through this module. Blocks are
//! named by [`Block`] offsets from the start of the first page, and stepping
//! to a physical neighbour is bounds-checked so boundary-tag walks never leave
//! the mapped, non-sentinel region.
//!
//! ```text
//!   offset 0                                                   len
//!   ┌──────────┬────────────┬────────────┬─────────┬──────────┐
//!   │ prologue │  block A   │  block B   │   ...   │ epilogue │
//!   │ header   │ hdr .. ftr │ hdr .. ftr │         │ footer   │
//!   └──────────┴────────────┴────────────┴─────────┴──────────┘
//!              ▲                                   ▲
//!              PROLOGUE_SIZE                       len - EPILOGUE_SIZE
//!              └──────────── in_heap ──────────────┘
//! ```

use std::ptr::{self, NonNull};

use crate::{
  block::{
    ALIGNMENT, Block, EPILOGUE_SIZE, FOOTER_SIZE, HEADER_SIZE, LINK_SIZE, MIN_BLOCK_SIZE,
    PROLOGUE_SIZE, Tag, TagKind,
  },
  error::ProviderError,
};

pub struct Heap {
  base: *mut u8,
  len: usize,
  pages: usize,
}

impl Heap {
  pub fn new() -> Self {
    Self {
      base: ptr::null_mut(),
      len: 0,
      pages: 0,
    }
  }

  pub fn is_mapped(&self) -> bool {
    !self.base.is_null()
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn pages(&self) -> usize {
    self.pages
  }

  pub fn base(&self) -> *mut u8 {
    self.base
  }

  /// One past the last mapped byte.
  pub fn end(&self) -> *mut u8 {
    self.base.wrapping_add(self.len)
  }

  pub fn epilogue_offset(&self) -> usize {
    self.len - EPILOGUE_SIZE
  }

  /// Appends a freshly mapped page. The first page fixes the heap base.
  pub fn push_page(
    &mut self,
    page: NonNull<u8>,
    page_size: usize,
  ) -> Result<(), ProviderError> {
    let addr = page.as_ptr() as usize;

    if self.base.is_null() {
      if addr % ALIGNMENT != 0 {
        return Err(ProviderError::Misaligned {
          addr,
          align: ALIGNMENT,
        });
      }
      self.base = page.as_ptr();
    } else if addr != self.end() as usize {
      return Err(ProviderError::Discontiguous {
        expected: self.end() as usize,
        got: addr,
      });
    }

    self.len += page_size;
    self.pages += 1;

    Ok(())
  }

  /// True iff `offset` lies past the prologue and before the epilogue.
  pub fn in_heap(
    &self,
    offset: usize,
  ) -> bool {
    self.len >= PROLOGUE_SIZE + EPILOGUE_SIZE
      && offset >= PROLOGUE_SIZE
      && offset < self.len - EPILOGUE_SIZE
  }

  fn read_word(
    &self,
    offset: usize,
  ) -> u64 {
    debug_assert!(offset + 8 <= self.len);
    // SAFETY: callers only pass offsets of tags or links inside the mapping.
    unsafe { ptr::read_unaligned(self.base.add(offset) as *const u64) }
  }

  fn write_word(
    &mut self,
    offset: usize,
    word: u64,
  ) {
    debug_assert!(offset + 8 <= self.len);
    // SAFETY: see `read_word`.
    unsafe { ptr::write_unaligned(self.base.add(offset) as *mut u64, word) }
  }

  pub fn tag(
    &self,
    offset: usize,
  ) -> Tag {
    Tag::decode(self.read_word(offset))
  }

  pub fn set_tag(
    &mut self,
    offset: usize,
    tag: Tag,
  ) {
    self.write_word(offset, tag.encode())
  }

  pub fn header(
    &self,
    block: Block,
  ) -> Tag {
    self.tag(block.offset())
  }

  pub fn set_header(
    &mut self,
    block: Block,
    tag: Tag,
  ) {
    self.set_tag(block.offset(), tag)
  }

  /// Footer as located by the block's header.
  pub fn footer(
    &self,
    block: Block,
  ) -> Tag {
    self.tag(block.footer_offset(self.header(block).block_size()))
  }

  /// Mirrors the current header into the footer slot it points at.
  pub fn write_footer(
    &mut self,
    block: Block,
  ) {
    let header = self.header(block);
    self.set_tag(block.footer_offset(header.block_size()), header.mirrored());
  }

  pub fn write_prologue(&mut self) {
    self.set_tag(0, Tag::sentinel(TagKind::Header));
  }

  pub fn write_epilogue(&mut self) {
    let offset = self.epilogue_offset();
    self.set_tag(offset, Tag::sentinel(TagKind::Footer));
  }

  fn link(
    &self,
    offset: usize,
  ) -> Option<Block> {
    match self.read_word(offset) {
      0 => None,
      raw => Some(Block(raw as usize)),
    }
  }

  pub fn next_link(
    &self,
    block: Block,
  ) -> Option<Block> {
    self.link(block.offset() + HEADER_SIZE)
  }

  pub fn prev_link(
    &self,
    block: Block,
  ) -> Option<Block> {
    self.link(block.offset() + HEADER_SIZE + LINK_SIZE)
  }

  pub fn set_next_link(
    &mut self,
    block: Block,
    next: Option<Block>,
  ) {
    self.write_word(block.offset() + HEADER_SIZE, next.map_or(0, |b| b.offset() as u64))
  }

  pub fn set_prev_link(
    &mut self,
    block: Block,
    prev: Option<Block>,
  ) {
    self.write_word(
      block.offset() + HEADER_SIZE + LINK_SIZE,
      prev.map_or(0, |b| b.offset() as u64),
    )
  }

  pub fn clear_links(
    &mut self,
    block: Block,
  ) {
    self.set_next_link(block, None);
    self.set_prev_link(block, None);
  }

  pub fn payload(
    &self,
    block: Block,
  ) -> NonNull<u8> {
    // SAFETY: the heap is mapped whenever a block exists, and base is non-null.
    unsafe { NonNull::new_unchecked(self.base.add(block.payload_offset())) }
  }

  /// Block whose payload starts at `addr`, if its header lies in the heap.
  ///
  /// Pure address arithmetic: nothing is read.
  pub fn block_of(
    &self,
    addr: *const u8,
  ) -> Option<Block> {
    let offset = (addr as usize)
      .checked_sub(self.base as usize)?
      .checked_sub(HEADER_SIZE)?;

    if !self.is_mapped() || !self.in_heap(offset) {
      return None;
    }

    Some(Block(offset))
  }

  /// Footer offset for a block of `size` bytes starting at `offset`, if the
  /// size is plausible and the footer lies in the heap.
  fn footer_in_heap(
    &self,
    offset: usize,
    size: usize,
  ) -> Option<usize> {
    if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 {
      return None;
    }

    let footer = offset.checked_add(size)?.checked_sub(FOOTER_SIZE)?;
    self.in_heap(footer).then_some(footer)
  }

  /// Footer offset for `block`, trusting only what passes the bounds check.
  pub fn checked_footer_offset(
    &self,
    block: Block,
  ) -> Option<usize> {
    if !self.in_heap(block.offset()) {
      return None;
    }
    self.footer_in_heap(block.offset(), self.header(block).block_size())
  }

  /// Physically following block, if its header and footer are both in heap.
  pub fn next_physical(
    &self,
    block: Block,
  ) -> Option<Block> {
    let next = block.offset() + self.header(block).block_size();
    let next = Block(next);

    self.checked_footer_offset(next).map(|_| next)
  }

  /// Block whose footer ends right before `offset`, if both its tags are in
  /// heap. Stepping back from the epilogue yields the trailing block.
  pub fn block_before(
    &self,
    offset: usize,
  ) -> Option<Block> {
    let footer = offset.checked_sub(FOOTER_SIZE)?;
    if !self.in_heap(footer) {
      return None;
    }

    let size = self.tag(footer).block_size();
    let start = (footer + FOOTER_SIZE).checked_sub(size)?;
    if !self.in_heap(start) || self.footer_in_heap(start, size) != Some(footer) {
      return None;
    }

    Some(Block(start))
  }

  pub fn prev_physical(
    &self,
    block: Block,
  ) -> Option<Block> {
    self.block_before(block.offset())
  }

  /// Last block before the epilogue.
  pub fn trailing_block(&self) -> Option<Block> {
    if !self.is_mapped() {
      return None;
    }
    self.block_before(self.epilogue_offset())
  }

  /// Copies `count` payload bytes from `from` into `to`.
  pub fn copy_payload(
    &mut self,
    from: Block,
    to: Block,
    count: usize,
  ) {
    debug_assert!(from.payload_offset() + count <= self.len);
    debug_assert!(to.payload_offset() + count <= self.len);
    debug_assert!(from != to);

    // SAFETY: both ranges lie inside distinct blocks of the mapping.
    unsafe {
      ptr::copy_nonoverlapping(
        self.base.add(from.payload_offset()),
        self.base.add(to.payload_offset()),
        count,
      )
    }
  }

  /// Walks blocks in address order from the first block up to the epilogue.
  ///
  /// Stops early at a block whose header size cannot be trusted.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      heap: self,
      offset: if self.is_mapped() { PROLOGUE_SIZE } else { self.len },
    }
  }
}

pub struct Blocks<'a> {
  heap: &'a Heap,
  offset: usize,
}

impl Iterator for Blocks<'_> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let block = Block(self.offset);
    self.heap.checked_footer_offset(block)?;
    self.offset += self.heap.header(block).block_size();
    Some(block)
  }
}
