/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use rzone::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::std::mem::size_of::<usize>())
  };
}

/// Rounds `value` up to the next multiple of `align`, which must be a power
/// of two.
///
/// # Examples
///
/// ```rust
/// use rzone::{align_to, ZONE_ALIGN};
///
/// assert_eq!(align_to!(1, ZONE_ALIGN), 16);
/// assert_eq!(align_to!(32, ZONE_ALIGN), 32);
/// assert_eq!(align_to!(33, 8), 40);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `value` down to a multiple of `align`.
pub(crate) const fn align_down(
  value: usize,
  align: usize,
) -> usize {
  value & !(align - 1)
}
