use crate::{
  block::{Block, FREE_ID, HEADER_SIZE, Owner, ZONE_ALIGN, ZONE_ID},
  error::{Corruption, ZoneError},
  tag::PurgeTag,
  zone::Zone,
};

impl Zone {
  /// Walks the whole block sequence and reports the first broken invariant.
  ///
  /// Checked, per block:
  ///
  /// ```text
  ///   ┌────────────┬──────────────────────────────────────────────┐
  ///   │ layout     │ starts where the previous block ended, size  │
  ///   │            │ aligned, stays inside the zone               │
  ///   │ links      │ next.prev points back at the block           │
  ///   │ state      │ free: FREE_ID, no owner, no free neighbor    │
  ///   │            │ used: ZONE_ID, valid tag, owner resolves to  │
  ///   │            │ the payload, purgable blocks have a handle   │
  ///   └────────────┴──────────────────────────────────────────────┘
  /// ```
  ///
  /// and for the zone as a whole: sizes sum to the zone size and the rover
  /// sits on one of the blocks.
  pub fn check_heap(&self) -> Result<(), ZoneError> {
    let base = self.arena.base();
    let end = self.arena.end();
    let offset = |address: *const u8| self.arena.offset_of(address);

    unsafe {
      let head = self.head();
      let mut block = head;
      let mut total = 0;
      let mut rover_seen = false;

      loop {
        let header = &*block;
        let at = block as *const u8;
        let room = end as usize - block as usize;

        if header.size < HEADER_SIZE + ZONE_ALIGN || header.size % ZONE_ALIGN != 0 || header.size > room {
          return Err(ZoneError::corrupted(at, Corruption::BadSize { size: header.size }));
        }

        if header.is_free() {
          if header.id != FREE_ID {
            return Err(ZoneError::corrupted(
              at,
              Corruption::BadMagic {
                expected: FREE_ID,
                found: header.id,
              },
            ));
          }

          if header.owner() != Owner::None {
            return Err(ZoneError::corrupted(at, Corruption::OwnedFree));
          }
        } else {
          if header.id != ZONE_ID {
            return Err(ZoneError::corrupted(
              at,
              Corruption::BadMagic {
                expected: ZONE_ID,
                found: header.id,
              },
            ));
          }

          if header.tag().is_none() {
            return Err(ZoneError::corrupted(at, Corruption::BadTag(header.tag)));
          }

          match header.owner() {
            Owner::None => return Err(ZoneError::corrupted(at, Corruption::MissingOwner)),
            Owner::Anonymous if header.tag().is_some_and(PurgeTag::is_purgable) => {
              return Err(ZoneError::corrupted(at, Corruption::UnownedPurgable));
            }
            Owner::Anonymous => {}
            Owner::Handle(index) => {
              let payload = Block::payload(block);
              let target = self.handles.target_at(index).unwrap_or(std::ptr::null_mut());

              if target != payload {
                return Err(ZoneError::corrupted(
                  at,
                  Corruption::OwnerMismatch {
                    handle: index,
                    expected: payload as usize,
                    found: target as usize,
                  },
                ));
              }
            }
          }
        }

        let block_end = Block::end(block);
        let next = header.next;

        if block_end == end {
          if next != head {
            return Err(ZoneError::corrupted(
              at,
              Corruption::Discontiguous {
                expected: 0,
                found: offset(next as *const u8),
              },
            ));
          }
        } else if next as *mut u8 != block_end {
          return Err(ZoneError::corrupted(
            at,
            Corruption::Discontiguous {
              expected: offset(block_end as *const u8),
              found: offset(next as *const u8),
            },
          ));
        } else if (end as usize) - (block_end as usize) < HEADER_SIZE {
          return Err(ZoneError::corrupted(block_end, Corruption::OutOfBounds));
        }

        if (*next).prev != block {
          return Err(ZoneError::corrupted(
            next as *const u8,
            Corruption::BrokenLink {
              expected: offset(at),
              found: offset((*next).prev as *const u8),
            },
          ));
        }

        if header.is_free() && next != head && (*next).is_free() {
          return Err(ZoneError::corrupted(next as *const u8, Corruption::AdjacentFree));
        }

        rover_seen |= block == self.rover;
        total += header.size;

        if next == head {
          break;
        }

        block = next;
      }

      if total != self.arena.size() {
        return Err(ZoneError::corrupted(
          base,
          Corruption::SizeTotal {
            expected: self.arena.size(),
            actual: total,
          },
        ));
      }

      if !rover_seen {
        return Err(ZoneError::corrupted(self.rover as *const u8, Corruption::RoverLost));
      }
    }

    Ok(())
  }
}
