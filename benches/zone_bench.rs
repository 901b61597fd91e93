use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use rzone::{PurgeTag, Zone, ZoneConfig};

const ZONE_SIZE: usize = 8 * 1024 * 1024;
const ALLOC_COUNT: usize = 1_000;

fn zone() -> Zone {
  Zone::init(ZoneConfig::with_size(ZONE_SIZE).paranoid(false).scribble(false))
}

fn malloc_free_churn(zone: &mut Zone) {
  let mut payloads = Vec::with_capacity(ALLOC_COUNT);

  for i in 0..ALLOC_COUNT {
    payloads.push(zone.malloc(16 + (i % 64) * 16));
  }

  for payload in payloads.iter().step_by(2) {
    unsafe { zone.free(payload.as_ptr()) };
  }

  for payload in payloads.iter().skip(1).step_by(2) {
    unsafe { zone.free(payload.as_ptr()) };
  }
}

fn level_cycle(zone: &mut Zone) {
  for i in 0..ALLOC_COUNT {
    black_box(zone.malloc_tag(32 + (i % 16) * 32, PurgeTag::Level, None));
  }

  zone.free_tag(PurgeTag::Level);
}

fn realloc_growth(zone: &mut Zone) {
  let mut payload = zone.malloc(16);

  for size in (32..16_384).step_by(32) {
    payload = unsafe { zone.realloc(payload.as_ptr(), size) }.unwrap_or(payload);
  }

  unsafe { zone.free(payload.as_ptr()) };
}

fn bench_group(c: &mut Criterion) {
  let mut churn = zone();
  c.bench_function("malloc free churn", |b| b.iter(|| malloc_free_churn(&mut churn)));

  let mut level = zone();
  c.bench_function("level cycle", |b| b.iter(|| level_cycle(&mut level)));

  let mut growth = zone();
  c.bench_function("realloc growth", |b| b.iter(|| realloc_growth(&mut growth)));
}

criterion_group!(benches, bench_group);
criterion_main!(benches);
