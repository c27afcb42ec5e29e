//! Read-only views of the heap for debugging and tests.

use std::fmt;

use crate::{
  block::{
    ALIGNMENT, Block, EPILOGUE_SIZE, MIN_BLOCK_SIZE, PROLOGUE_SIZE, Tag, TagKind, payload_capacity,
  },
  error::HeapCorruption,
  nextfit::NextFitAllocator,
  provider::PageProvider,
};

/// Snapshot of one free list member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlockInfo {
  pub offset: usize,
  pub address: usize,
  pub block_size: usize,
  pub next: Option<usize>,
  pub prev: Option<usize>,
}

/// Snapshot of both tags of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub offset: usize,
  pub payload: usize,
  pub header: Tag,
  pub footer: Tag,
}

impl BlockInfo {
  pub fn block_size(&self) -> usize {
    self.header.block_size()
  }

  pub fn requested_size(&self) -> usize {
    self.header.requested_size()
  }

  pub fn is_allocated(&self) -> bool {
    self.header.is_allocated()
  }

  /// Bytes the caller may use.
  pub fn capacity(&self) -> usize {
    payload_capacity(self.block_size())
  }
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "block @ {:#x} (payload {:#x})", self.offset, self.payload)?;
    writeln!(
      f,
      "  header: size={} alloc={} hid={:#010x} requested={}",
      self.header.block_size(),
      self.header.flag_set(),
      self.header.magic(),
      self.header.requested_size()
    )?;
    write!(
      f,
      "  footer: size={} alloc={} fid={:#010x} requested={}",
      self.footer.block_size(),
      self.footer.flag_set(),
      self.footer.magic(),
      self.footer.requested_size()
    )
  }
}

/// Whole-heap counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub pages: usize,
  pub heap_size: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub requested_bytes: usize,
}

/// Printable free list, one member per line or all on one line.
pub struct FreeListDump {
  blocks: Vec<FreeBlockInfo>,
  cursor: Option<usize>,
  compact: bool,
}

impl fmt::Display for FreeListDump {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    if self.blocks.is_empty() {
      return write!(f, "free list: (empty)");
    }

    if self.compact {
      write!(f, "free list:")?;
      for block in &self.blocks {
        let mark = if self.cursor == Some(block.offset) { "*" } else { "" };
        write!(f, " [{:#x}{} {}]", block.offset, mark, block.block_size)?;
      }
      return Ok(());
    }

    write!(f, "free list ({} blocks):", self.blocks.len())?;
    for block in &self.blocks {
      let mark = if self.cursor == Some(block.offset) { " <- cursor" } else { "" };
      write!(
        f,
        "\n  {:#x} @ {:#x}: size={} next={} prev={}{}",
        block.offset,
        block.address,
        block.block_size,
        fmt_link(block.next),
        fmt_link(block.prev),
        mark
      )?;
    }
    Ok(())
  }
}

fn fmt_link(link: Option<usize>) -> String {
  link.map_or_else(|| "-".to_string(), |offset| format!("{:#x}", offset))
}

impl<P: PageProvider> NextFitAllocator<P> {
  /// Free list members in list order.
  pub fn free_blocks(&self) -> Vec<FreeBlockInfo> {
    self
      .free_list
      .iter(&self.heap)
      .map(|block| FreeBlockInfo {
        offset: block.offset(),
        address: self.heap.base() as usize + block.offset(),
        block_size: self.heap.header(block).block_size(),
        next: self.heap.next_link(block).map(Block::offset),
        prev: self.heap.prev_link(block).map(Block::offset),
      })
      .collect()
  }

  /// Tags of the block whose payload starts at `ptr`, free or not, if both
  /// tags lie in the heap.
  pub fn block_info(
    &self,
    ptr: *const u8,
  ) -> Option<BlockInfo> {
    let block = self.heap.block_of(ptr)?;
    self.header_info(block.offset())
  }

  /// Tags of the block whose header sits at heap offset `offset`.
  pub fn header_info(
    &self,
    offset: usize,
  ) -> Option<BlockInfo> {
    let block = Block(offset);
    let footer = self.heap.checked_footer_offset(block)?;

    Some(BlockInfo {
      offset,
      payload: self.heap.payload(block).as_ptr() as usize,
      header: self.heap.header(block),
      footer: self.heap.tag(footer),
    })
  }

  /// Offset of the next-fit cursor.
  pub fn cursor_offset(&self) -> Option<usize> {
    self.free_list.cursor().map(Block::offset)
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      pages: self.heap.pages(),
      heap_size: self.heap.len(),
      ..HeapStats::default()
    };

    for block in self.heap.blocks() {
      let header = self.heap.header(block);
      if header.is_free() {
        stats.free_blocks += 1;
        stats.free_bytes += header.block_size();
        stats.largest_free = stats.largest_free.max(header.block_size());
      } else {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += header.block_size();
        stats.requested_bytes += header.requested_size();
      }
    }

    stats
  }

  pub fn dump(&self) -> FreeListDump {
    FreeListDump {
      blocks: self.free_blocks(),
      cursor: self.cursor_offset(),
      compact: false,
    }
  }

  pub fn dump_compact(&self) -> FreeListDump {
    FreeListDump {
      compact: true,
      ..self.dump()
    }
  }

  /// Walks every block and the free list, reporting the first broken
  /// invariant.
  pub fn check_heap(&self) -> Result<(), HeapCorruption> {
    let heap = &self.heap;
    if !heap.is_mapped() {
      return match self.free_list.head() {
        None => Ok(()),
        Some(block) => Err(HeapCorruption::NotFree {
          offset: block.offset(),
        }),
      };
    }

    let prologue = heap.tag(0);
    if !prologue.flag_set() || prologue.block_size() != 0 || !prologue.has_magic(TagKind::Header) {
      return Err(HeapCorruption::Sentinel { offset: 0 });
    }
    let epilogue_offset = heap.epilogue_offset();
    let epilogue = heap.tag(epilogue_offset);
    if !epilogue.flag_set() || epilogue.block_size() != 0 || !epilogue.has_magic(TagKind::Footer) {
      return Err(HeapCorruption::Sentinel {
        offset: epilogue_offset,
      });
    }
    if self.provider.heap_end() != heap.end() {
      return Err(HeapCorruption::Sentinel {
        offset: heap.len(),
      });
    }

    let mut offset = PROLOGUE_SIZE;
    let mut free_count = 0;
    let mut previous_free: Option<usize> = None;

    while offset < heap.len() - EPILOGUE_SIZE {
      let block = Block(offset);
      let header = heap.tag(offset);
      let size = header.block_size();

      if !header.has_magic(TagKind::Header) {
        return Err(HeapCorruption::Magic {
          offset,
          which: "header",
        });
      }
      if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 {
        return Err(HeapCorruption::BadSize { offset, size });
      }
      let Some(footer_offset) = heap.checked_footer_offset(block) else {
        return Err(HeapCorruption::Walk { offset });
      };
      let footer = heap.tag(footer_offset);
      if !footer.has_magic(TagKind::Footer) {
        return Err(HeapCorruption::Magic {
          offset,
          which: "footer",
        });
      }
      if !header.agrees_with(footer) {
        return Err(HeapCorruption::TagMismatch { offset });
      }

      if header.is_free() {
        if let Some(first) = previous_free {
          return Err(HeapCorruption::Uncoalesced {
            first,
            second: offset,
          });
        }
        previous_free = Some(offset);
        free_count += 1;
      } else if header.is_allocated() {
        previous_free = None;
      } else {
        return Err(HeapCorruption::BadRequested { offset });
      }

      offset += size;
    }

    if offset != heap.len() - EPILOGUE_SIZE {
      return Err(HeapCorruption::Walk { offset });
    }

    let mut listed = 0;
    let mut last: Option<Block> = None;
    for block in self.free_list.iter(heap) {
      if listed > free_count {
        return Err(HeapCorruption::Unreachable {
          listed,
          free: free_count,
        });
      }
      if !heap.in_heap(block.offset()) || !heap.header(block).is_free() {
        return Err(HeapCorruption::NotFree {
          offset: block.offset(),
        });
      }
      if last.is_some_and(|last| last >= block) {
        return Err(HeapCorruption::Order {
          offset: block.offset(),
        });
      }
      if heap.prev_link(block) != last {
        return Err(HeapCorruption::BackLink {
          offset: block.offset(),
        });
      }
      last = Some(block);
      listed += 1;
    }

    if listed != free_count || listed != self.free_list.len() {
      return Err(HeapCorruption::Unreachable {
        listed,
        free: free_count,
      });
    }

    if let Some(cursor) = self.free_list.cursor() {
      if !self.free_list.is_empty() && !self.free_list.contains(heap, cursor) {
        return Err(HeapCorruption::Cursor {
          offset: cursor.offset(),
        });
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use crate::{HeapConfig, NextFitAllocator};

  #[test]
  fn test_dump_formats() {
    let mut a = NextFitAllocator::new(HeapConfig::default()).unwrap();
    assert_eq!(a.dump().to_string(), "free list: (empty)");

    let p = a.allocate(100).unwrap();
    let q = a.allocate(100).unwrap();
    a.release(p.as_ptr()).unwrap();

    assert_eq!(
      a.dump_compact().to_string(),
      "free list: [0x8 128] [0x108* 3824]"
    );

    let full = a.dump().to_string();
    assert!(full.starts_with("free list (2 blocks):"));
    assert!(full.contains("0x8 @"));
    assert!(full.contains("next=0x108 prev=-"));
    assert!(full.contains("size=3824 next=- prev=0x8 <- cursor"));

    let info = a.block_info(q.as_ptr()).unwrap();
    assert_eq!(info.offset, 0x88);
    assert_eq!(info.block_size(), 128);
    assert_eq!(info.requested_size(), 100);
    assert_eq!(info.capacity(), 112);
    assert!(info.is_allocated());
    assert!(info.to_string().contains("hid=0x0badbee5 requested=100"));
    assert!(info.to_string().contains("fid=0xfaceba5e requested=100"));
  }

  #[test]
  fn test_header_info() {
    let mut a = NextFitAllocator::new(HeapConfig::default()).unwrap();
    assert_eq!(a.header_info(8), None);

    let p = a.allocate(40).unwrap();
    let info = a.header_info(8).unwrap();
    assert_eq!(Some(info), a.block_info(p.as_ptr()));
    assert_eq!(info.payload, p.as_ptr() as usize);
    assert_eq!(info.block_size(), 64);

    let rest = a.header_info(8 + 64).unwrap();
    assert!(!rest.is_allocated());
    assert_eq!(rest.block_size(), 4080 - 64);

    assert_eq!(a.header_info(0), None);
    assert_eq!(a.header_info(4088), None);
    assert_eq!(a.header_info(usize::MAX), None);
  }

  #[test]
  fn test_stats() {
    let mut a = NextFitAllocator::new(HeapConfig::default()).unwrap();
    assert_eq!(a.stats().pages, 0);

    a.allocate(100).unwrap();
    a.allocate(5).unwrap();

    let stats = a.stats();
    assert_eq!(stats.pages, 1);
    assert_eq!(stats.heap_size, 4096);
    assert_eq!(stats.allocated_blocks, 2);
    assert_eq!(stats.allocated_bytes, 160);
    assert_eq!(stats.requested_bytes, 105);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes, 4080 - 160);
    assert_eq!(stats.largest_free, 4080 - 160);
  }

  #[test]
  fn test_check_heap_accepts_fresh_and_used_heaps() {
    let mut a = NextFitAllocator::new(HeapConfig::default()).unwrap();
    assert_eq!(a.check_heap(), Ok(()));

    let p = a.allocate(300).unwrap();
    a.allocate(20).unwrap();
    a.release(p.as_ptr()).unwrap();
    assert_eq!(a.check_heap(), Ok(()));
  }

  #[test]
  fn test_check_heap_spots_damage() {
    let mut a = NextFitAllocator::new(HeapConfig::default()).unwrap();
    let p = a.allocate(40).unwrap();

    unsafe { p.as_ptr().sub(8).write(0) };
    assert!(a.check_heap().is_err());
  }
}
