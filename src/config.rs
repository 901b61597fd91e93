/// Settings fixed when a zone is created.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ZoneConfig {
  /// Bytes reserved for the zone. Rounded down to the zone alignment.
  pub size: usize,
  /// Run the full integrity check after every mutating operation and stop on
  /// the first violation.
  pub paranoid: bool,
  /// Fill freed payloads with [`SCRIBBLE_BYTE`].
  pub scribble: bool,
  /// Reclaim purgable blocks when an allocation would otherwise fail.
  pub purge_cache: bool,
}

pub const ZONE_CONFIG_DEFAULT_SIZE: usize = 8 * 1024 * 1024;
pub const ZONE_CONFIG_DEFAULT_PARANOID: bool = cfg!(debug_assertions);
pub const ZONE_CONFIG_DEFAULT_SCRIBBLE: bool = cfg!(debug_assertions);
pub const ZONE_CONFIG_DEFAULT_PURGE_CACHE: bool = true;

/// Pattern written over freed payloads when scribbling is on.
pub const SCRIBBLE_BYTE: u8 = 0xA5;

impl Default for ZoneConfig {
  fn default() -> Self {
    ZoneConfig {
      size: ZONE_CONFIG_DEFAULT_SIZE,
      paranoid: ZONE_CONFIG_DEFAULT_PARANOID,
      scribble: ZONE_CONFIG_DEFAULT_SCRIBBLE,
      purge_cache: ZONE_CONFIG_DEFAULT_PURGE_CACHE,
    }
  }
}

impl ZoneConfig {
  pub fn with_size(size: usize) -> Self {
    ZoneConfig {
      size,
      ..Self::default()
    }
  }

  pub fn paranoid(
    mut self,
    on: bool,
  ) -> Self {
    self.paranoid = on;
    self
  }

  pub fn scribble(
    mut self,
    on: bool,
  ) -> Self {
    self.scribble = on;
    self
  }

  pub fn purge_cache(
    mut self,
    on: bool,
  ) -> Self {
    self.purge_cache = on;
    self
  }
}
