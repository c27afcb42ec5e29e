use tagalloc::{HeapConfig, NextFitAllocator, PageProvider};

/// Prints the free list and the heap counters after each step.
fn snapshot<P: PageProvider>(
  label: &str,
  allocator: &NextFitAllocator<P>,
) {
  let stats = allocator.stats();
  println!(
    "[{}] pages = {}, free bytes = {}, allocated blocks = {}",
    label, stats.pages, stats.free_bytes, stats.allocated_blocks,
  );
  println!("{}", allocator.dump());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let mut allocator = NextFitAllocator::new(HeapConfig::default())?;

  snapshot("start", &allocator);

  // --------------------------------------------------------------------
  // 1) First allocation maps the first page: 4096 bytes minus the
  //    prologue and epilogue leaves one 4080-byte free block.
  // --------------------------------------------------------------------
  let value = allocator.allocate(size_of::<u32>())?;
  unsafe { value.cast::<u32>().write(320) };
  println!("\n[1] Allocate u32");
  println!("{}", allocator.block_info(value.as_ptr()).ok_or("no block")?);
  snapshot("1", &allocator);

  // --------------------------------------------------------------------
  // 2) A few more blocks of assorted sizes.
  // --------------------------------------------------------------------
  let blocks = [56, 17, 45, 78, 3].map(|size| allocator.allocate(size));
  println!("\n[2] Allocate 56, 17, 45, 78 and 3 bytes");
  snapshot("2", &allocator);

  // --------------------------------------------------------------------
  // 3) Free two non-adjacent blocks: they stay separate on the free list.
  // --------------------------------------------------------------------
  allocator.release(blocks[1]?.as_ptr())?;
  allocator.release(blocks[3]?.as_ptr())?;
  println!("\n[3] Release the 17 and 78 byte blocks");
  snapshot("3", &allocator);

  // --------------------------------------------------------------------
  // 4) Free the block between them: all three merge into one.
  // --------------------------------------------------------------------
  allocator.release(blocks[2]?.as_ptr())?;
  println!("\n[4] Release the 45 byte block");
  snapshot("4", &allocator);

  // --------------------------------------------------------------------
  // 5) A request larger than the page grows the heap.
  // --------------------------------------------------------------------
  let big = allocator.allocate(8192)?;
  println!("\n[5] Allocate 8192 bytes");
  snapshot("5", &allocator);

  // --------------------------------------------------------------------
  // 6) Resize moves the data into a new block and frees the old one.
  // --------------------------------------------------------------------
  let text = b"The last thing you'd want is someone else's data.";
  let small = allocator.allocate(text.len())?;
  unsafe { small.as_ptr().copy_from_nonoverlapping(text.as_ptr(), text.len()) };
  let moved = allocator.resize(small.as_ptr(), 256)?.ok_or("resize released")?;
  let copied = unsafe { std::slice::from_raw_parts(moved.as_ptr(), text.len()) };
  println!("\n[6] Resize to 256 bytes: {:?}", String::from_utf8_lossy(copied));
  snapshot("6", &allocator);

  // --------------------------------------------------------------------
  // 7) Errors: double release and a request past the page ceiling.
  // --------------------------------------------------------------------
  allocator.release(big.as_ptr())?;
  println!("\n[7] Release twice: {:?}", allocator.release(big.as_ptr()));
  println!("[7] Allocate 30000 bytes: {:?}", allocator.allocate(30000));

  allocator.check_heap()?;
  println!("\n[8] Heap is consistent: {}", allocator.dump_compact());

  Ok(())
}
