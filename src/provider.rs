//! Page-acquisition primitives the heap grows through.
//!
//! A provider behaves like `sbrk`: it has a current end, and growing it by one
//! page hands back the start of that page, which must sit exactly at the
//! previous end.

use std::{io, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::{align, block::ALIGNMENT, error::ProviderError};

pub trait PageProvider {
  /// Current end of the region handed out so far.
  fn heap_end(&self) -> *mut u8;

  /// Extends the region by one page of `page_size` bytes and returns its start.
  fn grow(
    &mut self,
    page_size: usize,
  ) -> Result<NonNull<u8>, ProviderError>;
}

fn os_page_size() -> usize {
  // SAFETY: sysconf has no preconditions.
  match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
    n if n > 0 => n as usize,
    _ => 4096,
  }
}

/// Private anonymous reservation whose pages are made accessible one heap page
/// at a time. The whole reservation is unmapped on drop.
pub struct MmapProvider {
  base: NonNull<u8>,
  reserved: usize,
  committed: usize,
  brk: usize,
  os_page: usize,
}

impl MmapProvider {
  /// Reserves address space for `capacity` bytes without committing any of it.
  pub fn new(capacity: usize) -> Result<Self, ProviderError> {
    let os_page = os_page_size();
    let reserved = align!(capacity.max(1), os_page);

    // SAFETY: anonymous mapping with no fixed address.
    let addr = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        reserved,
        libc::PROT_NONE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(io::Error::last_os_error().into());
    }

    let base = NonNull::new(addr as *mut u8).ok_or(ProviderError::Exhausted)?;

    log::debug!("[mmap] reserved {} bytes at {:p}", reserved, base);

    Ok(Self {
      base,
      reserved,
      committed: 0,
      brk: 0,
      os_page,
    })
  }

  /// Bytes of address space still available to `grow`.
  pub fn remaining(&self) -> usize {
    self.reserved - self.brk
  }
}

impl PageProvider for MmapProvider {
  fn heap_end(&self) -> *mut u8 {
    self.base.as_ptr().wrapping_add(self.brk)
  }

  fn grow(
    &mut self,
    page_size: usize,
  ) -> Result<NonNull<u8>, ProviderError> {
    let new_brk = self
      .brk
      .checked_add(page_size)
      .filter(|&end| end <= self.reserved)
      .ok_or(ProviderError::Exhausted)?;

    if new_brk > self.committed {
      let commit_end = align!(new_brk, self.os_page).min(self.reserved);

      // SAFETY: the range lies inside our reservation and starts on an OS page.
      let rc = unsafe {
        libc::mprotect(
          self.base.as_ptr().add(self.committed) as *mut c_void,
          commit_end - self.committed,
          libc::PROT_READ | libc::PROT_WRITE,
        )
      };

      if rc != 0 {
        return Err(io::Error::last_os_error().into());
      }

      self.committed = commit_end;
    }

    // SAFETY: brk <= reserved, so the pointer stays inside the mapping.
    let page = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(self.brk)) };
    self.brk = new_brk;

    Ok(page)
  }
}

impl Drop for MmapProvider {
  fn drop(&mut self) {
    // SAFETY: base/reserved describe exactly the mapping created in `new`.
    unsafe {
      libc::munmap(self.base.as_ptr() as *mut c_void, self.reserved);
    }
  }
}

/// Grows the process data segment with `sbrk(2)`.
///
/// The break is never lowered again: other users of the break (the system
/// allocator among them) may have pages above ours.
pub struct SbrkProvider {
  end: Option<usize>,
}

impl SbrkProvider {
  pub fn new() -> Self {
    Self { end: None }
  }
}

impl Default for SbrkProvider {
  fn default() -> Self {
    Self::new()
  }
}

fn sbrk_failed(addr: *mut c_void) -> bool {
  addr == usize::MAX as *mut c_void
}

impl PageProvider for SbrkProvider {
  fn heap_end(&self) -> *mut u8 {
    match self.end {
      Some(end) => end as *mut u8,
      None => unsafe { sbrk(0) as *mut u8 },
    }
  }

  fn grow(
    &mut self,
    page_size: usize,
  ) -> Result<NonNull<u8>, ProviderError> {
    let current = unsafe { sbrk(0) };
    if sbrk_failed(current) {
      return Err(io::Error::last_os_error().into());
    }
    let current = current as usize;

    let padding = match self.end {
      Some(end) if end != current => {
        return Err(ProviderError::Discontiguous {
          expected: end,
          got: current,
        });
      }
      Some(_) => 0,
      None => align!(current, ALIGNMENT) - current,
    };

    let old = unsafe { sbrk((padding + page_size) as intptr_t) };
    if sbrk_failed(old) {
      return Err(io::Error::last_os_error().into());
    }
    if old as usize != current {
      return Err(ProviderError::Discontiguous {
        expected: current,
        got: old as usize,
      });
    }

    let start = current + padding;
    self.end = Some(start + page_size);

    NonNull::new(start as *mut u8).ok_or(ProviderError::Exhausted)
  }
}
