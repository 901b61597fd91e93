use std::{
  io::{IsTerminal, Read},
  ptr::{self, NonNull},
};

use rzone::{PurgeTag, Zone, ZoneConfig};

/// Waits until the user presses ENTER, so the mapping can be inspected with
/// `pmap` or `gdb` between steps. Skipped when stdin is not a terminal.
fn block_until_enter_pressed() {
  if !std::io::stdin().is_terminal() {
    return;
  }

  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints where a payload landed and how many bytes it can hold.
fn print_alloc(
  zone: &Zone,
  label: &str,
  payload: NonNull<u8>,
) {
  let usable = unsafe { zone.usable_size(payload.as_ptr()) }.unwrap_or(0);

  println!(
    "[{}] payload = {:p}, usable = {} bytes, addr % 16 = {}",
    label,
    payload,
    usable,
    payload.as_ptr() as usize % 16
  );
}

fn print_zone(zone: &Zone) {
  let stats = zone.stats();

  println!(
    "    zone: {} blocks ({} free), used {} / {} bytes, largest free {}",
    stats.blocks, stats.free_blocks, stats.used, stats.total, stats.largest_free
  );

  for block in zone.blocks() {
    let state = block.tag.map_or("free", PurgeTag::name);
    println!("      {:>8} {:>8} {}", block.offset, block.size, state);
  }
}

fn main() {
  // RUST_LOG=trace shows every allocation the zone makes.
  env_logger::init();

  let mut zone = Zone::init(ZoneConfig::with_size(1024 * 1024));

  println!("[start] PID = {}, zone of {} bytes", std::process::id(), zone.size());
  print_zone(&zone);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Session data lives in Static blocks.
  // --------------------------------------------------------------------
  let name = zone.strdup("E1M1");
  println!("\n[1] strdup(\"E1M1\")");
  print_alloc(&zone, "1", name);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Load a level: everything here is tagged Level.
  // --------------------------------------------------------------------
  let things = zone.calloc_tag(128, 32, PurgeTag::Level, None);
  let lines = zone.malloc_tag(6000, PurgeTag::Level, None);
  unsafe { ptr::write_bytes(lines.as_ptr(), 0xAB, 6000) };

  println!("\n[2] Level loaded");
  print_alloc(&zone, "2", things);
  print_alloc(&zone, "2", lines);
  print_zone(&zone);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Grow the lines array. The block after it is free, so it
  //    grows in place.
  // --------------------------------------------------------------------
  let grown = unsafe { zone.realloc(lines.as_ptr(), 12_000) };

  println!("\n[3] realloc lines to 12000 bytes");
  if let Some(grown) = grown {
    print_alloc(&zone, "3", grown);
    println!(
      "[3] moved? {}, first byte still 0x{:X}",
      grown != lines,
      unsafe { *grown.as_ptr() }
    );
  }

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A cached lump, owned by a handle so the zone can purge it.
  // --------------------------------------------------------------------
  let sound = zone.new_handle();
  let lump = zone.malloc_tag(64 * 1024, PurgeTag::Cache, Some(sound));

  println!("\n[4] Cached 64 KiB lump");
  print_alloc(&zone, "4", lump);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Ask for more than is left. The cached lump is purged to make room
  //    and its handle no longer resolves.
  // --------------------------------------------------------------------
  let request = zone.stats().largest_free + 32 * 1024;
  let big = zone.malloc(request);

  println!("\n[5] Allocate {} bytes", request);
  print_alloc(&zone, "5", big);
  println!("[5] cached lump still resident? {}", zone.resolve(sound).is_some());

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Level over: one call releases every Level block.
  // --------------------------------------------------------------------
  zone.free_tag(PurgeTag::Level);

  println!("\n[6] free_tag(Level)");
  print_zone(&zone);
  println!("[6] name still reads {:?}", unsafe {
    std::ffi::CStr::from_ptr(name.as_ptr() as *const std::ffi::c_char)
  });

  match zone.check_heap() {
    Ok(()) => println!("[6] check_heap: ok"),
    Err(error) => println!("[6] check_heap: {}", error),
  }

  // --------------------------------------------------------------------
  // 7) End of demo. Dropping the zone unmaps the arena.
  // --------------------------------------------------------------------
  println!("\n[7] End of example.");
}
