use std::fmt;

/// Purge class of a used block.
///
/// Tags are a small closed set. New lifetime phases are added as variants
/// before [`PurgeTag::Cache`]; every tag at or above `Cache` is purgable and
/// may be reclaimed by the zone itself when an allocation would otherwise
/// fail.
///
/// ```text
///   0           1          2
///   ┌──────────┬──────────┬──────────┐
///   │  Static  │  Level   │  Cache   │ MAX
///   └──────────┴──────────┴──────────┘
///    never      swept on   reclaimed
///    swept      level exit under pressure
/// ```
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PurgeTag {
  /// Lives for the whole session. Bulk purges never touch it unless it is
  /// requested explicitly.
  Static = 0,
  /// Lives until the current level ends.
  Level = 1,
  /// Purgable. Requires an owner handle so the owner can observe the purge.
  Cache = 2,
}

impl PurgeTag {
  /// Terminal sentinel: every valid tag is below it.
  pub const MAX: u8 = 3;

  /// First purgable tag.
  pub const PURGE_LEVEL: PurgeTag = PurgeTag::Cache;

  /// Every tag, in raw order.
  pub const ALL: [PurgeTag; PurgeTag::MAX as usize] =
    [PurgeTag::Static, PurgeTag::Level, PurgeTag::Cache];

  pub const fn from_raw(raw: u8) -> Option<PurgeTag> {
    match raw {
      0 => Some(PurgeTag::Static),
      1 => Some(PurgeTag::Level),
      2 => Some(PurgeTag::Cache),
      _ => None,
    }
  }

  pub const fn as_raw(self) -> u8 {
    self as u8
  }

  /// Whether the zone may reclaim blocks with this tag on its own.
  pub const fn is_purgable(self) -> bool {
    self.as_raw() >= Self::PURGE_LEVEL.as_raw()
  }

  pub const fn name(self) -> &'static str {
    match self {
      PurgeTag::Static => "static",
      PurgeTag::Level => "level",
      PurgeTag::Cache => "cache",
    }
  }
}

impl fmt::Display for PurgeTag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_raw_values_are_dense() {
    for (i, tag) in PurgeTag::ALL.iter().enumerate() {
      assert_eq!(tag.as_raw() as usize, i);
      assert_eq!(PurgeTag::from_raw(i as u8), Some(*tag));
    }

    assert_eq!(PurgeTag::from_raw(PurgeTag::MAX), None);
    assert_eq!(PurgeTag::from_raw(u8::MAX), None);
  }

  #[test]
  fn test_only_cache_is_purgable() {
    assert!(!PurgeTag::Static.is_purgable());
    assert!(!PurgeTag::Level.is_purgable());
    assert!(PurgeTag::Cache.is_purgable());
  }

  #[test]
  fn test_display() {
    assert_eq!(PurgeTag::Level.to_string(), "level");
  }
}
