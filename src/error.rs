use thiserror::Error;

use crate::tag::PurgeTag;

/// The kind of damage found in the block sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
  #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
  BadMagic { expected: u32, found: u32 },

  #[error("invalid tag byte {0:#04x}")]
  BadTag(u8),

  #[error("block size {size} is not a multiple of the zone alignment or leaves the zone")]
  BadSize { size: usize },

  #[error("block should start at offset {expected}, starts at offset {found}")]
  Discontiguous { expected: usize, found: usize },

  #[error("broken back link: expected prev at offset {expected}, found offset {found}")]
  BrokenLink { expected: usize, found: usize },

  #[error("two adjacent free blocks")]
  AdjacentFree,

  #[error("free block carries an owner")]
  OwnedFree,

  #[error("used block carries no owner marker")]
  MissingOwner,

  #[error("purgable block has no owner handle")]
  UnownedPurgable,

  #[error("block sizes sum to {actual}, zone holds {expected}")]
  SizeTotal { expected: usize, actual: usize },

  #[error("owner handle {handle} resolves to {found:#x}, payload is at {expected:#x}")]
  OwnerMismatch { handle: u32, expected: usize, found: usize },

  #[error("rover does not point at a block in the sequence")]
  RoverLost,

  #[error("header lies outside the zone")]
  OutOfBounds,
}

/// Errors signalled by the zone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZoneError {
  #[error(
    "zone exhausted: failed to allocate {requested} bytes ({free} of {total} bytes free, largest free block {largest_free})"
  )]
  Exhausted {
    requested: usize,
    free: usize,
    largest_free: usize,
    total: usize,
  },

  #[error("allocation size overflows: {count} x {size}")]
  SizeOverflow { count: usize, size: usize },

  #[error("zone corrupted at {address:#x}: {corruption}")]
  Corrupted { address: usize, corruption: Corruption },

  #[error("double free of {address:#x}")]
  DoubleFree { address: usize },

  #[error("pointer {address:#x} was not allocated from this zone")]
  Foreign { address: usize },

  #[error("purgable tag {tag} needs an owner handle")]
  UnownedPurgable { tag: PurgeTag },

  #[error("handle {index} is no longer valid")]
  StaleHandle { index: u32 },

  #[error("failed to reserve {size} bytes for the zone: {reason}")]
  ReservationFailed { size: usize, reason: String },

  #[error("zone of {size} bytes is smaller than the minimum of {minimum}")]
  ZoneTooSmall { size: usize, minimum: usize },
}

impl ZoneError {
  pub(crate) fn corrupted(
    address: *const u8,
    corruption: Corruption,
  ) -> Self {
    ZoneError::Corrupted {
      address: address as usize,
      corruption,
    }
  }
}

/// Stops the program on an unrecoverable zone condition.
#[cold]
#[track_caller]
pub(crate) fn fatal(error: ZoneError) -> ! {
  log::error!("zone: {}", error);

  panic!("{}", error)
}
