/// Rounds `value` up to the next multiple of `to`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(13, 16), 16);
/// assert_eq!(align!(16, 16), 16);
/// assert_eq!(align!(100 + 16, 16), 128);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr, $to:expr) => {
    ($value + $to - 1) & !($to - 1)
  };
}

/// Checked form of [`align!`]: `None` when rounding would overflow `usize`.
pub const fn checked_align(
  value: usize,
  to: usize,
) -> Option<usize> {
  match value.checked_add(to - 1) {
    Some(v) => Some(v & !(to - 1)),
    None => None,
  }
}
