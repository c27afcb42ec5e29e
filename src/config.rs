use crate::{
  block::{ALIGNMENT, TAG_FIELD_MAX},
  error::ConfigError,
};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_MAX_PAGES: usize = 5;

/// Tunable heap geometry.
///
/// Every block size, including one spanning the whole heap, must fit the
/// 16-bit size field of a tag, so `page_size * max_pages` is capped at
/// 65535 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  page_size: usize,
  max_pages: usize,
}

impl HeapConfig {
  pub fn new(
    page_size: usize,
    max_pages: usize,
  ) -> Result<Self, ConfigError> {
    if page_size < 4 * ALIGNMENT || page_size % ALIGNMENT != 0 {
      return Err(ConfigError::PageSize(page_size));
    }
    if max_pages == 0 {
      return Err(ConfigError::NoPages);
    }
    match page_size.checked_mul(max_pages) {
      Some(total) if total <= TAG_FIELD_MAX => Ok(Self { page_size, max_pages }),
      _ => Err(ConfigError::TooLarge {
        pages: max_pages,
        page_size,
      }),
    }
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  pub fn max_pages(&self) -> usize {
    self.max_pages
  }

  /// Largest number of bytes the heap may ever map.
  pub fn max_heap_size(&self) -> usize {
    self.page_size * self.max_pages
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      page_size: DEFAULT_PAGE_SIZE,
      max_pages: DEFAULT_MAX_PAGES,
    }
  }
}
