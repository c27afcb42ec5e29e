use crate::{block::Block, heap::Heap};

/// Address-ordered doubly linked list threaded through the free blocks of a
/// [`Heap`], plus the next-fit cursor.
///
/// The list itself only stores the head: `next`/`prev` live inside the blocks.
#[derive(Debug, Default)]
pub struct FreeList {
  head: Option<Block>,
  cursor: Option<Block>,
  len: usize,
}

impl FreeList {
  pub const fn new() -> Self {
    FreeList {
      head: None,
      cursor: None,
      len: 0,
    }
  }

  pub const fn head(&self) -> Option<Block> {
    self.head
  }

  /// Block the next search resumes from.
  pub const fn cursor(&self) -> Option<Block> {
    self.cursor
  }

  pub const fn len(&self) -> usize {
    self.len
  }

  pub const fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Makes `block` the only member.
  pub fn reset(
    &mut self,
    heap: &mut Heap,
    block: Block,
  ) {
    heap.clear_links(block);
    self.head = Some(block);
    self.cursor = Some(block);
    self.len = 1;
  }

  /// Inserts `block` keeping the list sorted by address.
  pub fn insert(
    &mut self,
    heap: &mut Heap,
    block: Block,
  ) {
    let Some(head) = self.head else {
      heap.clear_links(block);
      self.head = Some(block);
      self.cursor = Some(block);
      self.len = 1;
      return;
    };

    if block < head {
      heap.set_next_link(block, Some(head));
      heap.set_prev_link(block, None);
      heap.set_prev_link(head, Some(block));
      self.head = Some(block);
      self.len += 1;
      return;
    }

    let mut current = head;
    while let Some(next) = heap.next_link(current) {
      if next > block {
        break;
      }
      current = next;
    }

    self.insert_after(heap, current, block);
  }

  /// Links `block` directly behind `anchor`. The caller guarantees `block`
  /// lies between `anchor` and its successor.
  pub fn insert_after(
    &mut self,
    heap: &mut Heap,
    anchor: Block,
    block: Block,
  ) {
    let next = heap.next_link(anchor);

    heap.set_next_link(block, next);
    heap.set_prev_link(block, Some(anchor));
    if let Some(next) = next {
      heap.set_prev_link(next, Some(block));
    }
    heap.set_next_link(anchor, Some(block));

    self.len += 1;
  }

  /// Unlinks a member in O(1). The cursor is left alone.
  pub fn unlink(
    &mut self,
    heap: &mut Heap,
    block: Block,
  ) {
    let next = heap.next_link(block);
    let prev = heap.prev_link(block);

    match prev {
      Some(prev) => heap.set_next_link(prev, next),
      None => self.head = next,
    }
    if let Some(next) = next {
      heap.set_prev_link(next, prev);
    }

    heap.clear_links(block);
    self.len -= 1;
  }

  /// Unlinks a block being handed out and moves the cursor to its successor,
  /// or back to the head when it was the last member.
  pub fn take(
    &mut self,
    heap: &mut Heap,
    block: Block,
  ) {
    let next = heap.next_link(block);
    self.unlink(heap, block);
    self.cursor = next.or(self.head);
  }

  /// Repoints the cursor from a block absorbed by coalescing to the survivor.
  pub fn retarget_cursor(
    &mut self,
    absorbed: Block,
    survivor: Block,
  ) {
    if self.cursor == Some(absorbed) {
      self.cursor = Some(survivor);
    }
  }

  /// Linear membership check from the head.
  pub fn contains(
    &self,
    heap: &Heap,
    block: Block,
  ) -> bool {
    self.iter(heap).any(|member| member == block)
  }

  /// Next-fit search for a block of at least `size` bytes.
  ///
  /// Starts at the cursor, runs to the tail, wraps to the head and stops when
  /// it comes back around. The cursor follows the search: it rests on the hit,
  /// or returns to where the search began after a miss.
  pub fn find_next_fit(
    &mut self,
    heap: &Heap,
    size: usize,
  ) -> Option<Block> {
    let start = self.cursor.or(self.head)?;

    let mut current = Some(start);
    while let Some(block) = current {
      if heap.header(block).block_size() >= size {
        self.cursor = Some(block);
        return Some(block);
      }
      current = heap.next_link(block);
    }

    current = self.head;
    while let Some(block) = current {
      if block == start {
        break;
      }
      if heap.header(block).block_size() >= size {
        self.cursor = Some(block);
        return Some(block);
      }
      current = heap.next_link(block);
    }

    self.cursor = Some(start);
    None
  }

  pub fn iter<'a>(
    &self,
    heap: &'a Heap,
  ) -> Iter<'a> {
    Iter {
      heap,
      current: self.head,
    }
  }
}

pub struct Iter<'a> {
  heap: &'a Heap,
  current: Option<Block>,
}

impl Iterator for Iter<'_> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let block = self.current?;
    self.current = self.heap.next_link(block);
    Some(block)
  }
}
