use std::ptr::NonNull;

use crate::{
  block::{
    Block, EPILOGUE_SIZE, MIN_BLOCK_SIZE, PROLOGUE_SIZE, TAG_FIELD_MAX, Tag, TagKind,
    actual_block_size, payload_capacity,
  },
  config::HeapConfig,
  error::{AllocError, ProviderError},
  freelist::FreeList,
  heap::Heap,
  provider::{MmapProvider, PageProvider},
};

/// Boundary-tagged heap with an address-ordered free list and next-fit
/// placement.
///
/// All state lives in this value: the mapped pages, the free list and its
/// cursor. Nothing is mapped until the first allocation; dropping the
/// allocator drops the provider, which releases whatever it mapped.
pub struct NextFitAllocator<P: PageProvider> {
  pub(crate) provider: P,
  pub(crate) config: HeapConfig,
  pub(crate) heap: Heap,
  pub(crate) free_list: FreeList,
  last_error: Option<AllocError>,
}

impl NextFitAllocator<MmapProvider> {
  /// Allocator over a private reservation sized to the configured ceiling.
  pub fn new(config: HeapConfig) -> Result<Self, ProviderError> {
    let provider = MmapProvider::new(config.max_heap_size())?;
    Ok(Self::with_provider(provider, config))
  }
}

impl<P: PageProvider> NextFitAllocator<P> {
  pub fn with_provider(
    provider: P,
    config: HeapConfig,
  ) -> Self {
    Self {
      provider,
      config,
      heap: Heap::new(),
      free_list: FreeList::new(),
      last_error: None,
    }
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  /// Pages mapped so far.
  pub fn pages(&self) -> usize {
    self.heap.pages()
  }

  /// Error of the most recent failed call, kept until the next failure.
  pub fn last_error(&self) -> Option<AllocError> {
    self.last_error
  }

  fn record<T>(
    &mut self,
    result: Result<T, AllocError>,
  ) -> Result<T, AllocError> {
    if let Err(err) = &result {
      self.last_error = Some(*err);
    }
    result
  }

  /// Allocates at least `size` bytes, 16-byte aligned.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let result = self.allocate_inner(size);
    match result {
      Ok(ptr) => log::trace!("[nextfit] allocate({}) -> {:p}", size, ptr),
      Err(err) => log::trace!("[nextfit] allocate({}) -> {}", size, err),
    }
    self.record(result)
  }

  /// Returns a block obtained from [`allocate`](Self::allocate) or
  /// [`resize`](Self::resize) to the heap.
  ///
  /// The pointer is validated against the block's boundary tags before
  /// anything is touched; a pointer that does not name a live allocation,
  /// including one already released, fails with
  /// [`AllocError::InvalidArgument`].
  pub fn release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    let result = self.release_inner(ptr);
    match result {
      Ok(()) => log::trace!("[nextfit] release({:p})", ptr),
      Err(err) => log::trace!("[nextfit] release({:p}) -> {}", ptr, err),
    }
    self.record(result)
  }

  /// Moves an allocation into a block of `size` bytes.
  ///
  /// A null `ptr` allocates; a zero `size` releases and returns `None`. A
  /// `size` equal to the block's current payload capacity returns `ptr`
  /// untouched. Otherwise a new block is allocated, `min(capacity, size)`
  /// bytes are copied across and the old block is released. If the new
  /// allocation fails the old block is left as it was.
  pub fn resize(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let result = self.resize_inner(ptr, size);
    match result {
      Ok(new) => log::trace!("[nextfit] resize({:p}, {}) -> {:?}", ptr, size, new),
      Err(err) => log::trace!("[nextfit] resize({:p}, {}) -> {}", ptr, size, err),
    }
    self.record(result)
  }

  fn allocate_inner(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::InvalidArgument);
    }
    if size > TAG_FIELD_MAX {
      return Err(AllocError::OutOfMemory);
    }

    if self.heap.pages() == 0 {
      self.bootstrap()?;
    }

    let required = actual_block_size(size).ok_or(AllocError::OutOfMemory)?;

    let block = match self.free_list.find_next_fit(&self.heap, required) {
      Some(block) => block,
      None => self.extend(required)?,
    };

    Ok(self.place(block, required, size))
  }

  fn release_inner(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    if ptr.is_null() {
      return Err(AllocError::InvalidArgument);
    }

    let block = self.validate(ptr)?;
    let survivor = self.coalesce(block)?;

    self.heap.write_footer(survivor);
    self.free_list.insert(&mut self.heap, survivor);

    Ok(())
  }

  fn resize_inner(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let Some(old_ptr) = NonNull::new(ptr) else {
      return self.allocate_inner(size).map(Some);
    };

    if size == 0 {
      return self.release_inner(ptr).map(|()| None);
    }

    let old = self.validate(ptr)?;
    let old_capacity = payload_capacity(self.heap.header(old).block_size());

    if old_capacity == size {
      return Ok(Some(old_ptr));
    }

    // The old block must be releasable before anything new is handed out.
    self.mergeable_neighbours(old)?;

    let new_ptr = self.allocate_inner(size)?;
    let new = self
      .heap
      .block_of(new_ptr.as_ptr())
      .ok_or(AllocError::OutOfMemory)?;

    self.heap.copy_payload(old, new, old_capacity.min(size));

    if let Err(err) = self.release_inner(ptr) {
      if self.release_inner(new_ptr.as_ptr()).is_err() {
        log::error!("[nextfit] could not roll back block {:p}", new_ptr);
      }
      return Err(err);
    }

    Ok(Some(new_ptr))
  }

  /// Maps one page through the provider and appends it to the heap.
  fn map_page(&mut self) -> Result<(), AllocError> {
    let page_size = self.config.page_size();

    if self.heap.pages() >= self.config.max_pages() {
      return Err(AllocError::OutOfMemory);
    }

    let page = self.provider.grow(page_size).map_err(|err| {
      log::warn!("[nextfit] page provider failed: {}", err);
      AllocError::OutOfMemory
    })?;

    self.heap.push_page(page, page_size).map_err(|err| {
      log::warn!("[nextfit] rejected page {:p}: {}", page, err);
      AllocError::OutOfMemory
    })?;

    log::debug!(
      "[nextfit] mapped page {} at {:p}, heap now {} bytes",
      self.heap.pages(),
      page,
      self.heap.len()
    );

    Ok(())
  }

  /// Maps the first page: prologue, epilogue and one free block between them.
  fn bootstrap(&mut self) -> Result<(), AllocError> {
    self.map_page()?;

    self.heap.write_prologue();
    self.heap.write_epilogue();

    let block = Block(PROLOGUE_SIZE);
    let size = self.config.page_size() - PROLOGUE_SIZE - EPILOGUE_SIZE;
    self.heap.set_header(block, Tag::free(TagKind::Header, size));
    self.heap.write_footer(block);
    self.free_list.reset(&mut self.heap, block);

    log::debug!("[nextfit] heap initialised at {:p}", self.heap.base());

    Ok(())
  }

  fn trailing_free_block(&self) -> Option<Block> {
    self
      .heap
      .trailing_block()
      .filter(|&block| self.heap.header(block).is_free())
  }

  /// Grows the heap until its trailing free block spans `required` bytes.
  ///
  /// Fails without mapping anything when the page ceiling rules the request
  /// out. Pages already mapped when the provider fails stay in the heap as
  /// free space.
  fn extend(
    &mut self,
    required: usize,
  ) -> Result<Block, AllocError> {
    let page_size = self.config.page_size();
    let spare_pages = self.config.max_pages() - self.heap.pages();
    let trailing_free = self
      .trailing_free_block()
      .map_or(0, |block| self.heap.header(block).block_size());

    if trailing_free + spare_pages * page_size < required {
      log::debug!(
        "[nextfit] cannot extend for {} bytes: {} free at tail, {} pages left",
        required,
        trailing_free,
        spare_pages
      );
      return Err(AllocError::OutOfMemory);
    }

    loop {
      let trailing = self.trailing_free_block();
      let old_epilogue = self.heap.epilogue_offset();

      self.map_page()?;

      let block = match trailing {
        Some(block) => {
          let size = self.heap.header(block).block_size() + page_size;
          self.heap.set_header(block, Tag::free(TagKind::Header, size));
          self.heap.write_footer(block);
          block
        }
        None => {
          let block = Block(old_epilogue);
          self.heap.set_header(block, Tag::free(TagKind::Header, page_size));
          self.heap.write_footer(block);
          self.free_list.insert(&mut self.heap, block);
          block
        }
      };
      self.heap.write_epilogue();

      if self.heap.header(block).block_size() >= required {
        return Ok(block);
      }
    }
  }

  /// Hands out `block`, splitting off the tail when it is big enough to be a
  /// block of its own.
  fn place(
    &mut self,
    block: Block,
    required: usize,
    requested: usize,
  ) -> NonNull<u8> {
    let size = self.heap.header(block).block_size();

    let committed = if size - required >= MIN_BLOCK_SIZE {
      let rest = Block(block.offset() + required);
      self.heap.set_header(rest, Tag::free(TagKind::Header, size - required));
      self.heap.write_footer(rest);
      self.free_list.insert_after(&mut self.heap, block, rest);
      required
    } else {
      size
    };

    self
      .heap
      .set_header(block, Tag::allocated(TagKind::Header, committed, requested));
    self.heap.write_footer(block);
    self.free_list.take(&mut self.heap, block);

    self.heap.payload(block)
  }

  /// Block behind a caller pointer, if its tags say it is a live allocation.
  fn validate(
    &self,
    ptr: *const u8,
  ) -> Result<Block, AllocError> {
    let invalid = || {
      log::warn!("[nextfit] invalid pointer {:p}", ptr);
      AllocError::InvalidArgument
    };

    let block = self.heap.block_of(ptr).ok_or_else(invalid)?;
    let footer_offset = self.heap.checked_footer_offset(block).ok_or_else(invalid)?;

    let header = self.heap.header(block);
    let footer = self.heap.tag(footer_offset);

    let valid = header.has_magic(TagKind::Header)
      && footer.has_magic(TagKind::Footer)
      && header.agrees_with(footer)
      && header.is_allocated()
      && footer.is_allocated();

    if valid { Ok(block) } else { Err(invalid()) }
  }

  /// A physical neighbour that may be merged: both tags intact, in
  /// agreement, and free.
  fn free_neighbour(
    &self,
    candidate: Option<Block>,
  ) -> Option<Block> {
    let block = candidate?;
    let footer_offset = self.heap.checked_footer_offset(block)?;
    let header = self.heap.header(block);
    let footer = self.heap.tag(footer_offset);

    let free = header.has_magic(TagKind::Header)
      && footer.has_magic(TagKind::Footer)
      && header.agrees_with(footer)
      && header.is_free()
      && footer.is_free();

    free.then_some(block)
  }

  /// Free physical neighbours of `block`, failing if the free list does not
  /// hold one of them.
  fn mergeable_neighbours(
    &self,
    block: Block,
  ) -> Result<(Option<Block>, Option<Block>), AllocError> {
    let prev = self.free_neighbour(self.heap.prev_physical(block));
    let next = self.free_neighbour(self.heap.next_physical(block));

    for neighbour in [prev, next].into_iter().flatten() {
      if !self.free_list.contains(&self.heap, neighbour) {
        log::error!(
          "[nextfit] free block at {:#x} next to {:#x} is missing from the free list",
          neighbour.offset(),
          block.offset()
        );
        return Err(AllocError::OutOfMemory);
      }
    }

    Ok((prev, next))
  }

  /// Marks `block` free and merges it with free physical neighbours.
  ///
  /// Returns the surviving block, unlinked and with a stale footer. Every
  /// neighbour is checked for list membership before anything changes, so a
  /// free list that disagrees with the boundary tags fails the call with the
  /// heap untouched.
  fn coalesce(
    &mut self,
    block: Block,
  ) -> Result<Block, AllocError> {
    let (prev, next) = self.mergeable_neighbours(block)?;

    let mut size = self.heap.header(block).block_size();
    self.heap.set_header(block, Tag::free(TagKind::Header, size));
    self.heap.clear_links(block);

    let mut survivor = block;

    if let Some(next) = next {
      self.free_list.unlink(&mut self.heap, next);
      size += self.heap.header(next).block_size();
      self.free_list.retarget_cursor(next, survivor);
    }

    if let Some(prev) = prev {
      self.free_list.unlink(&mut self.heap, prev);
      size += self.heap.header(prev).block_size();
      survivor = prev;
      if let Some(next) = next {
        self.free_list.retarget_cursor(next, survivor);
      }
      self.free_list.retarget_cursor(block, survivor);
    }

    if prev.is_some() || next.is_some() {
      log::trace!(
        "[nextfit] coalesced {:#x} (prev: {}, next: {}) into {:#x}, {} bytes",
        block.offset(),
        prev.is_some(),
        next.is_some(),
        survivor.offset(),
        size
      );
    }

    self.heap.set_header(survivor, Tag::free(TagKind::Header, size));

    Ok(survivor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn allocator() -> NextFitAllocator<MmapProvider> {
    NextFitAllocator::new(HeapConfig::default()).unwrap()
  }

  fn offset_of(
    a: &NextFitAllocator<impl PageProvider>,
    ptr: NonNull<u8>,
  ) -> usize {
    ptr.as_ptr() as usize - a.heap.base() as usize
  }

  fn free_sizes(a: &NextFitAllocator<impl PageProvider>) -> Vec<(usize, usize)> {
    a.free_list
      .iter(&a.heap)
      .map(|b| (b.offset(), a.heap.header(b).block_size()))
      .collect()
  }

  /// Provider that refuses to grow after a fixed number of pages.
  struct Limited {
    inner: MmapProvider,
    left: usize,
  }

  impl PageProvider for Limited {
    fn heap_end(&self) -> *mut u8 {
      self.inner.heap_end()
    }

    fn grow(
      &mut self,
      page_size: usize,
    ) -> Result<NonNull<u8>, ProviderError> {
      if self.left == 0 {
        return Err(ProviderError::Exhausted);
      }
      self.left -= 1;
      self.inner.grow(page_size)
    }
  }

  #[test]
  fn test_nothing_mapped_before_first_allocation() {
    let a = allocator();
    assert_eq!(a.pages(), 0);
    assert!(a.free_list.is_empty());
  }

  #[test]
  fn test_bootstrap_layout() {
    let mut a = allocator();
    let p = a.allocate(1).unwrap();

    assert_eq!(a.pages(), 1);
    assert_eq!(offset_of(&a, p), 16);
    assert!(a.heap.tag(0).flag_set());
    assert_eq!(a.heap.tag(0).block_size(), 0);
    assert!(a.heap.tag(4088).flag_set());
    assert!(a.heap.tag(4088).has_magic(TagKind::Footer));
    assert_eq!(free_sizes(&a), vec![(40, 4048)]);
  }

  #[test]
  fn test_split_and_restore() {
    let mut a = allocator();
    let p = a.allocate(100).unwrap();

    let block = a.heap.block_of(p.as_ptr()).unwrap();
    assert_eq!(a.heap.header(block).block_size(), 128);
    assert_eq!(a.heap.header(block).requested_size(), 100);
    assert_eq!(free_sizes(&a), vec![(136, 3952)]);

    a.release(p.as_ptr()).unwrap();
    assert_eq!(free_sizes(&a), vec![(8, 4080)]);
  }

  #[test]
  fn test_small_leftover_is_committed_whole() {
    let mut a = allocator();
    // 4080 - 4064 = 16 bytes left over, too small to split off.
    let p = a.allocate(4040).unwrap();

    let block = a.heap.block_of(p.as_ptr()).unwrap();
    assert_eq!(a.heap.header(block).block_size(), 4080);
    assert_eq!(a.heap.header(block).requested_size(), 4040);
    assert!(a.free_list.is_empty());
    assert_eq!(a.free_list.cursor(), None);
  }

  #[test]
  fn test_zero_size_is_invalid_and_maps_nothing() {
    let mut a = allocator();
    assert_eq!(a.allocate(0), Err(AllocError::InvalidArgument));
    assert_eq!(a.pages(), 0);
    assert_eq!(a.last_error(), Some(AllocError::InvalidArgument));
  }

  #[test]
  fn test_extend_grows_trailing_free_block() {
    let mut a = allocator();
    a.allocate(10).unwrap();

    let big = a.allocate(8192).unwrap();
    assert_eq!(a.pages(), 3);

    let block = a.heap.block_of(big.as_ptr()).unwrap();
    assert_eq!(block.offset(), 40);
    assert_eq!(a.heap.header(block).block_size(), 8208);
    assert_eq!(free_sizes(&a), vec![(8248, 12288 - 16 - 8240)]);
  }

  #[test]
  fn test_extend_after_allocated_tail_creates_new_block() {
    let mut a = allocator();
    a.allocate(4050).unwrap();
    assert!(a.free_list.is_empty());

    let p = a.allocate(100).unwrap();
    assert_eq!(a.pages(), 2);
    // New block starts where the old epilogue was.
    assert_eq!(offset_of(&a, p), 4088 + 8);
    assert_eq!(free_sizes(&a), vec![(4088 + 128, 4096 - 128)]);
    assert!(a.heap.tag(8184).has_magic(TagKind::Footer));
  }

  #[test]
  fn test_ceiling_failure_maps_nothing() {
    let mut a = allocator();
    a.allocate(16).unwrap();

    assert_eq!(a.allocate(20449), Err(AllocError::OutOfMemory));
    assert_eq!(a.pages(), 1);
    assert_eq!(free_sizes(&a), vec![(40, 4048)]);
  }

  #[test]
  fn test_largest_request_fills_heap() {
    let mut a = allocator();
    let p = a.allocate(20448).unwrap();

    assert_eq!(a.pages(), 5);
    let block = a.heap.block_of(p.as_ptr()).unwrap();
    assert_eq!(a.heap.header(block).block_size(), 20464);
    assert!(a.free_list.is_empty());
    assert_eq!(a.allocate(1), Err(AllocError::OutOfMemory));
  }

  #[test]
  fn test_provider_failure_keeps_mapped_pages() {
    let inner = MmapProvider::new(5 * 4096).unwrap();
    let mut a = NextFitAllocator::with_provider(Limited { inner, left: 2 }, HeapConfig::default());

    a.allocate(16).unwrap();
    assert_eq!(a.allocate(10000), Err(AllocError::OutOfMemory));
    assert_eq!(a.pages(), 2);
    // The second page was merged into the trailing free block.
    assert_eq!(free_sizes(&a), vec![(40, 4048 + 4096)]);

    assert!(a.allocate(8000).is_ok());
  }

  #[test]
  fn test_bootstrap_failure() {
    let inner = MmapProvider::new(4096).unwrap();
    let mut a = NextFitAllocator::with_provider(Limited { inner, left: 0 }, HeapConfig::default());

    assert_eq!(a.allocate(8), Err(AllocError::OutOfMemory));
    assert_eq!(a.pages(), 0);
  }

  #[test]
  fn test_release_rejects_bad_pointers() {
    let mut a = allocator();
    assert_eq!(a.release(std::ptr::null_mut()), Err(AllocError::InvalidArgument));

    let p = a.allocate(40).unwrap();
    let before = free_sizes(&a);

    let mut local = 0u64;
    assert_eq!(
      a.release(&mut local as *mut u64 as *mut u8),
      Err(AllocError::InvalidArgument)
    );
    assert_eq!(
      a.release(unsafe { p.as_ptr().add(16) }),
      Err(AllocError::InvalidArgument)
    );
    assert_eq!(free_sizes(&a), before);
  }

  #[test]
  fn test_release_rejects_corrupted_footer() {
    let mut a = allocator();
    let p = a.allocate(40).unwrap();
    let block = a.heap.block_of(p.as_ptr()).unwrap();

    let footer_offset = a.heap.checked_footer_offset(block).unwrap();
    a.heap
      .set_tag(footer_offset, Tag::allocated(TagKind::Footer, 64, 41));

    assert_eq!(a.release(p.as_ptr()), Err(AllocError::InvalidArgument));
    assert_eq!(free_sizes(&a), vec![(72, 4016)]);
  }

  #[test]
  fn test_double_release() {
    let mut a = allocator();
    let p = a.allocate(24).unwrap();
    a.allocate(24).unwrap();

    a.release(p.as_ptr()).unwrap();
    assert_eq!(a.release(p.as_ptr()), Err(AllocError::InvalidArgument));
  }

  #[test]
  fn test_coalesce_cases() {
    let mut a = allocator();
    let p = [0; 5].map(|_| a.allocate(16).unwrap());
    // Blocks of 32 bytes at 8, 40, 72, 104, 136; free tail at 168.

    // Neither neighbour free.
    a.release(p[1].as_ptr()).unwrap();
    assert_eq!(free_sizes(&a), vec![(40, 32), (168, 3920)]);

    // Previous free.
    a.release(p[2].as_ptr()).unwrap();
    assert_eq!(free_sizes(&a), vec![(40, 64), (168, 3920)]);

    // Next free.
    a.release(p[4].as_ptr()).unwrap();
    assert_eq!(free_sizes(&a), vec![(40, 64), (136, 3952)]);

    // Both free.
    a.release(p[3].as_ptr()).unwrap();
    assert_eq!(free_sizes(&a), vec![(40, 4048)]);

    a.release(p[0].as_ptr()).unwrap();
    assert_eq!(free_sizes(&a), vec![(8, 4080)]);
  }

  #[test]
  fn test_coalesce_repoints_cursor() {
    let mut a = allocator();
    let p = [0; 3].map(|_| a.allocate(16).unwrap());
    assert_eq!(a.free_list.cursor(), Some(Block(104)));

    a.release(p[2].as_ptr()).unwrap();
    assert_eq!(a.free_list.cursor(), Some(Block(72)));

    a.release(p[0].as_ptr()).unwrap();
    a.release(p[1].as_ptr()).unwrap();
    assert_eq!(a.free_list.cursor(), Some(Block(8)));
    assert_eq!(free_sizes(&a), vec![(8, 4080)]);
  }

  #[test]
  fn test_list_disagreement_is_reported() {
    let mut a = allocator();
    let p = [0; 3].map(|_| a.allocate(16).unwrap());
    a.release(p[0].as_ptr()).unwrap();

    // Pull the freed block out of the list behind the allocator's back.
    a.free_list.unlink(&mut a.heap, Block(8));

    assert_eq!(a.release(p[1].as_ptr()), Err(AllocError::OutOfMemory));
    let block = a.heap.block_of(p[1].as_ptr()).unwrap();
    assert!(a.heap.header(block).is_allocated());
  }

  #[test]
  fn test_resize_with_list_disagreement_leaves_heap_alone() {
    let mut a = allocator();
    let p = [0; 3].map(|_| a.allocate(16).unwrap());
    a.release(p[0].as_ptr()).unwrap();
    a.free_list.unlink(&mut a.heap, Block(8));

    let stats = a.stats();
    let listed = free_sizes(&a);

    assert_eq!(a.resize(p[1].as_ptr(), 200), Err(AllocError::OutOfMemory));
    assert_eq!(a.stats(), stats);
    assert_eq!(free_sizes(&a), listed);

    let block = a.heap.block_of(p[1].as_ptr()).unwrap();
    assert!(a.heap.header(block).is_allocated());
  }

  #[test]
  fn test_corrupt_previous_header_is_not_merged() {
    let mut a = allocator();
    let p = [0; 3].map(|_| a.allocate(16).unwrap());
    a.release(p[1].as_ptr()).unwrap();

    // The footer still looks sane, but the header claims a huge block.
    let middle = a.heap.block_of(p[1].as_ptr()).unwrap();
    a.heap
      .set_header(middle, Tag::free(TagKind::Header, 0xfff0));

    a.release(p[2].as_ptr()).unwrap();

    assert_eq!(a.heap.header(middle).block_size(), 0xfff0);
    let last = a.heap.block_of(p[2].as_ptr()).unwrap();
    assert!(a.heap.header(last).is_free());
    assert!(a.free_list.contains(&a.heap, last));
  }

  #[test]
  fn test_next_fit_skips_earlier_hole() {
    let mut a = allocator();
    let p = [0; 4].map(|_| a.allocate(16).unwrap());
    a.release(p[1].as_ptr()).unwrap();

    // Cursor sits on the tail block; the hole at 40 is behind it.
    let q = a.allocate(16).unwrap();
    assert_eq!(offset_of(&a, q), 136 + 8);

    a.release(p[3].as_ptr()).unwrap();
    let r = a.allocate(16).unwrap();
    assert_ne!(offset_of(&a, r), 48);
  }

  #[test]
  fn test_resize_same_capacity_is_noop() {
    let mut a = allocator();
    let p = a.allocate(100).unwrap();
    let before = free_sizes(&a);

    assert_eq!(a.resize(p.as_ptr(), 112), Ok(Some(p)));
    assert_eq!(free_sizes(&a), before);
  }

  #[test]
  fn test_resize_copies_payload() {
    let mut a = allocator();
    let p = a.allocate(40).unwrap();
    a.allocate(8).unwrap();

    unsafe {
      for i in 0..40 {
        p.as_ptr().add(i).write(i as u8);
      }
    }

    let grown = a.resize(p.as_ptr(), 200).unwrap().unwrap();
    assert_ne!(grown, p);
    unsafe {
      for i in 0..40 {
        assert_eq!(*grown.as_ptr().add(i), i as u8);
      }
    }

    let shrunk = a.resize(grown.as_ptr(), 10).unwrap().unwrap();
    unsafe {
      for i in 0..10 {
        assert_eq!(*shrunk.as_ptr().add(i), i as u8);
      }
    }
    assert_eq!(a.release(grown.as_ptr()), Err(AllocError::InvalidArgument));
  }

  #[test]
  fn test_resize_failure_keeps_original() {
    let mut a = allocator();
    let p = a.allocate(40).unwrap();
    unsafe { p.as_ptr().write(0x5a) };

    assert_eq!(a.resize(p.as_ptr(), 30000), Err(AllocError::OutOfMemory));
    let block = a.heap.block_of(p.as_ptr()).unwrap();
    assert!(a.heap.header(block).is_allocated());
    assert_eq!(unsafe { *p.as_ptr() }, 0x5a);
  }

  #[test]
  fn test_resize_null_and_zero() {
    let mut a = allocator();
    let p = a.resize(std::ptr::null_mut(), 24).unwrap().unwrap();
    assert_eq!(offset_of(&a, p), 16);

    assert_eq!(a.resize(p.as_ptr(), 0), Ok(None));
    assert_eq!(free_sizes(&a), vec![(8, 4080)]);
    assert_eq!(a.release(p.as_ptr()), Err(AllocError::InvalidArgument));
  }
}
