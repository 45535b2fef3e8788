//! Reader and writer drawing from the limiters a config describes.

use std::io;
use std::sync::Arc;

use bwlimit_limiter::{LimiterConfig, ThrottleConfig, TrafficLimiters};
use bwlimit_nullables::{NullClock, NullStream};
use bwlimit_stream::{ThrottledReader, ThrottledWriter};
use bwlimit_types::Clock;

fn config(share_budget: bool) -> ThrottleConfig {
    ThrottleConfig {
        upload: LimiterConfig::new(2_000, 0),
        download: LimiterConfig::new(4_000, 0),
        share_budget,
        ..ThrottleConfig::default()
    }
}

fn source(len: usize) -> (Vec<u8>, NullStream) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let chunks = data.chunks(500).map(<[u8]>::to_vec).collect::<Vec<_>>();
    (data, NullStream::with_chunks(chunks))
}

#[test]
fn copy_is_paced_by_the_slower_direction() {
    let clock = Arc::new(NullClock::new(0));
    let limiters = TrafficLimiters::with_clock(&config(false), clock.clone());
    let (data, stream) = source(6_000);

    let mut reader = ThrottledReader::new(stream, false);
    reader.set_limiter(limiters.received.clone());
    let mut writer = ThrottledWriter::new(NullStream::new(), false);
    writer.set_limiter(limiters.sent.clone());

    let copied = io::copy(&mut reader, &mut writer).unwrap();
    assert_eq!(copied, 6_000);
    assert_eq!(writer.get_ref().written(), data);

    assert_eq!(limiters.received.stats().total_used, 6_000);
    assert_eq!(limiters.sent.stats().total_used, 6_000);
    // Upload at 2000 B/s is the bottleneck: roughly three seconds.
    let elapsed = clock.now().as_millis();
    assert!((2_500..=3_500).contains(&elapsed), "elapsed {elapsed}ms");
}

#[test]
fn shared_budget_counts_both_directions() {
    let clock = Arc::new(NullClock::new(0));
    let limiters = TrafficLimiters::with_clock(&config(true), clock.clone());
    let (_, stream) = source(2_000);

    let mut reader = ThrottledReader::new(stream, false);
    reader.set_limiter(limiters.received.clone());
    let mut writer = ThrottledWriter::new(NullStream::new(), false);
    writer.set_limiter(limiters.sent.clone());

    io::copy(&mut reader, &mut writer).unwrap();
    assert_eq!(limiters.sent.stats().total_used, 4_000);
    // 4000 bytes through one 2000 B/s budget.
    assert!(clock.now().as_millis() >= 1_800);
}

#[test]
fn control_channel_bypasses_limits() {
    let clock = Arc::new(NullClock::new(0));
    let limiters = TrafficLimiters::with_clock(&config(false), clock.clone());
    let (data, stream) = source(50_000);

    let mut reader = ThrottledReader::with_limiter(stream, true, limiters.received.clone());
    let mut writer = ThrottledWriter::with_limiter(NullStream::new(), true, limiters.sent.clone());
    io::copy(&mut reader, &mut writer).unwrap();

    assert_eq!(writer.get_ref().written(), data);
    assert!(clock.sleeps().is_empty());
}
