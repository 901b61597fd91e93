//! # rzone - A Tagged Zone Allocator
//!
//! This crate provides a **zone allocator**: one fixed-size arena, reserved
//! once at startup, carved into variable-size blocks. Every used block
//! carries a purge tag, so everything allocated for one phase of a program
//! (a level, a scene) can be released in a single pass.
//!
//! ## Overview
//!
//! ```text
//!   Zone Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              ZONE                                    │
//!   │                                                                      │
//!   │   ┌──────┬─────────┬──────┬───────────────┬──────┬────────────────┐  │
//!   │   │ hdr  │ STATIC  │ hdr  │     free      │ hdr  │     LEVEL      │  │
//!   │   └──────┴─────────┴──────┴───────────────┴──────┴────────────────┘  │
//!   │   ▲                        ▲                                      │  │
//!   │   │                        │                                      │  │
//!   │  base                    rover                                  base │
//!   │                       (next search)                            + size│
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Blocks tile the zone with no gaps and are linked in address order.
//!   The last block links back to the first.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rzone
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── arena      - The single mmap reservation (internal)
//!   ├── block      - In-zone block header, split and merge
//!   ├── check      - Integrity check of the block sequence
//!   ├── config     - ZoneConfig
//!   ├── error      - ZoneError, Corruption
//!   ├── handle     - Owner handles that follow relocated blocks
//!   ├── stats      - Occupancy statistics and block iteration
//!   ├── tag        - PurgeTag
//!   └── zone       - Zone: allocate, free, realloc, free_tag
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rzone::{PurgeTag, Zone, ZoneConfig};
//!
//! let mut zone = Zone::new(ZoneConfig::with_size(1 << 20)).unwrap();
//!
//! // Lives for the whole session.
//! let name = zone.strdup("E1M1");
//!
//! // Lives until the level ends.
//! let things = zone.calloc_tag(64, 32, PurgeTag::Level, None);
//! unsafe { *things.as_ptr() = 7 };
//!
//! // Level over: one call releases everything tagged Level.
//! zone.free_tag(PurgeTag::Level);
//!
//! assert_eq!(zone.stats().tagged(PurgeTag::Level), 0);
//! assert_eq!(unsafe { *name.as_ptr() }, b'E');
//! ```
//!
//! ## How It Works
//!
//! Each allocation is a block with a header in front of the payload:
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         Payload                │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ next / prev     │  │  │                          │  │
//!   │  │ user: owner     │  │  │  N - header bytes usable │  │
//!   │  │ id: magic       │  │  │                          │  │
//!   │  │ tag: purge tag  │  │  └──────────────────────────┘  │
//!   │  └─────────────────┘  │                                │
//!   │  HEADER_SIZE bytes    │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to the caller
//! ```
//!
//! Allocation is next-fit: the search starts at the rover, walks forward,
//! wraps around once, and takes the first free block that is big enough.
//! A block much bigger than the request is split. Freeing merges the block
//! with free neighbors right away, so two free blocks are never adjacent.
//!
//! ```text
//!   free(B):
//!
//!   ┌──────┬──────┬──────┐         ┌────────────────────┐
//!   │ free │  B   │ free │   ──►   │        free        │
//!   └──────┴──────┴──────┘         └────────────────────┘
//! ```
//!
//! ## Owner Handles
//!
//! A [`Handle`] passed as the owner of an allocation always resolves to the
//! current address of that allocation. When `realloc` has to move a block,
//! or the block is freed, purged, or swept by `free_tag`, the handle follows.
//!
//! ## Failure
//!
//! Every operation comes in two flavors. `try_*` returns a [`ZoneError`];
//! the plain form treats any error as fatal and panics with a diagnostic.
//! Corruption found in a block header is always reported, never ignored.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Zone` is neither `Send` nor `Sync`
//! - **Fixed size**: the zone never grows after creation
//! - **Unix-only**: Requires `libc` and `mmap` (POSIX systems)
//!
//! ## Safety
//!
//! Allocation is safe. Operations that take a payload address (`free`,
//! `realloc`, `change_tag`, `usable_size`) are `unsafe`: the zone validates
//! the header it finds, but cannot prove the address came from it.

pub mod align;
mod arena;
mod block;
mod check;
mod config;
mod error;
mod handle;
mod stats;
mod tag;
mod zone;


pub use block::{HEADER_SIZE, MIN_FRAGMENT, ZONE_ALIGN};
pub use config::{
  SCRIBBLE_BYTE, ZONE_CONFIG_DEFAULT_PARANOID, ZONE_CONFIG_DEFAULT_PURGE_CACHE,
  ZONE_CONFIG_DEFAULT_SCRIBBLE, ZONE_CONFIG_DEFAULT_SIZE, ZoneConfig,
};
pub use error::{Corruption, ZoneError};
pub use handle::Handle;
pub use stats::{BlockInfo, Blocks, ZoneStats};
pub use tag::PurgeTag;
pub use zone::Zone;
