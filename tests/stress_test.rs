//! Stress Test - Multi-Producer Multi-Consumer via Independent Handles
//!
//! Setiap thread attach ke segment dengan handle sendiri, sama seperti
//! process terpisah. Producer menulis nomor sequence global ke setiap elemen;
//! consumer memverifikasi stream yang diterima gap-free dan urut.
//!
//! Usage:
//!   cargo test --release --test stress_test -- --nocapture

use shm_disruptor::{Disruptor, DisruptorConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const NUM_ELEMENTS: u32 = 1024;
const ELEMENT_SIZE: u32 = 16;
const NUM_PRODUCERS: u64 = 4;
const NUM_CONSUMERS: u32 = 3;
const PER_PRODUCER: u64 = 50_000;
const TOTAL: u64 = NUM_PRODUCERS * PER_PRODUCER;

/// Statistics collector
struct StressStats {
    produced: AtomicU64,
    claims: AtomicU64,
    consumed: AtomicU64,
    consume_batches: AtomicU64,
    max_batch: AtomicU64,
}

impl StressStats {
    fn new() -> Self {
        Self {
            produced: AtomicU64::new(0),
            claims: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            consume_batches: AtomicU64::new(0),
            max_batch: AtomicU64::new(0),
        }
    }

    fn record_batch(&self, n: u64) {
        self.consumed.fetch_add(n, Ordering::Relaxed);
        self.consume_batches.fetch_add(1, Ordering::Relaxed);

        // Update max (CAS loop)
        let mut current = self.max_batch.load(Ordering::Relaxed);
        while n > current {
            match self.max_batch.compare_exchange_weak(
                current,
                n,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }
}

struct TestRing {
    name: String,
}

impl Drop for TestRing {
    fn drop(&mut self) {
        let _ = Disruptor::destroy(&self.name);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(name: &str) -> DisruptorConfig {
    DisruptorConfig::new(name, NUM_ELEMENTS, ELEMENT_SIZE, NUM_CONSUMERS).spin(true)
}

fn run_producer(name: String, producer_id: u64, stats: Arc<StressStats>) {
    let mut d = Disruptor::open(config(&name)).unwrap();
    let mut remaining = PER_PRODUCER;
    let mut round = 0u64;

    while remaining > 0 {
        let want = remaining.min(1 + round % 7);
        let (start, end) = {
            let mut claim = if round % 2 == 0 {
                d.claim_many(want).unwrap()
            } else {
                d.claim_avail(want).unwrap()
            };
            assert!(!claim.is_empty());

            for (i, element) in claim.bufs.elements_mut().enumerate() {
                let seq = claim.start + i as u64;
                element[..8].copy_from_slice(&seq.to_le_bytes());
                element[8..].copy_from_slice(&producer_id.to_le_bytes());
            }
            (claim.start, claim.end)
        };

        assert!(d.commit(start, end).unwrap());

        let n = end - start + 1;
        remaining -= n;
        round += 1;
        stats.produced.fetch_add(n, Ordering::Relaxed);
        stats.claims.fetch_add(1, Ordering::Relaxed);
    }
}

fn run_consumer(
    name: String,
    consumer_id: u32,
    stats: Arc<StressStats>,
) -> [u64; NUM_PRODUCERS as usize] {
    let mut d = Disruptor::open(config(&name).consumer(consumer_id)).unwrap();
    let mut expected = 0u64;
    let mut per_producer = [0u64; NUM_PRODUCERS as usize];

    while expected < TOTAL {
        let consumed = d.consume_new().unwrap();
        assert_eq!(consumed.start, expected, "consumer {consumer_id} saw a gap");

        let mut n = 0u64;
        for element in consumed.bufs.elements() {
            let seq = u64::from_le_bytes(element[..8].try_into().unwrap());
            let producer = u64::from_le_bytes(element[8..].try_into().unwrap());
            assert_eq!(seq, expected, "consumer {consumer_id} read stale or reordered data");
            per_producer[producer as usize] += 1;
            expected += 1;
            n += 1;
        }
        assert!(n <= NUM_ELEMENTS as u64);
        stats.record_batch(n);
    }

    assert!(d.consume_commit().unwrap());
    assert_eq!(d.my_position().unwrap(), TOTAL);
    per_producer
}

#[test]
fn stress_multi_producer_multi_consumer() {
    init_tracing();
    let ring = TestRing {
        name: format!("/shmd-stress-{}", std::process::id()),
    };
    let init = Disruptor::open(config(&ring.name).init(true)).unwrap();
    let stats = Arc::new(StressStats::new());
    let start = Instant::now();

    let consumers: Vec<_> = (0..NUM_CONSUMERS)
        .map(|id| {
            let name = ring.name.clone();
            let stats = Arc::clone(&stats);
            thread::spawn(move || run_consumer(name, id, stats))
        })
        .collect();

    let producers: Vec<_> = (0..NUM_PRODUCERS)
        .map(|id| {
            let name = ring.name.clone();
            let stats = Arc::clone(&stats);
            thread::spawn(move || run_producer(name, id, stats))
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    for c in consumers {
        let per_producer = c.join().unwrap();
        assert!(per_producer.iter().all(|&n| n == PER_PRODUCER));
    }

    let elapsed = start.elapsed();
    assert_eq!(init.cursor().unwrap(), TOTAL);
    assert_eq!(init.next().unwrap(), TOTAL);
    assert_eq!(stats.produced.load(Ordering::Relaxed), TOTAL);
    assert_eq!(
        stats.consumed.load(Ordering::Relaxed),
        TOTAL * NUM_CONSUMERS as u64
    );

    println!("📊 Stress Test Results");
    println!("  Elements:      {}", TOTAL);
    println!("  Claims:        {}", stats.claims.load(Ordering::Relaxed));
    println!(
        "  Consume batches: {} (max {})",
        stats.consume_batches.load(Ordering::Relaxed),
        stats.max_batch.load(Ordering::Relaxed)
    );
    println!(
        "  Throughput:    {:.2} M elements/sec",
        TOTAL as f64 / elapsed.as_secs_f64() / 1_000_000.0
    );
}

#[test]
fn stress_recover_abandoned_claim() {
    init_tracing();
    let ring = TestRing {
        name: format!("/shmd-stress-recover-{}", std::process::id()),
    };
    let mut survivor = Disruptor::open(config(&ring.name).init(true)).unwrap();

    // Producer "crash": claim lalu release tanpa commit
    let abandoned = thread::spawn({
        let name = ring.name.clone();
        move || {
            let mut d = Disruptor::open(config(&name)).unwrap();
            let claim = d.claim_many(8).unwrap();
            let range = (claim.start, claim.end);
            d.release(false);
            range
        }
    })
    .join()
    .unwrap();

    // Producer lain claim setelahnya; commit-nya tertahan oleh range yang ditinggal
    let (start, end) = {
        let claim = survivor.claim_many(4).unwrap();
        (claim.start, claim.end)
    };
    assert_eq!((start, end), (8, 11));

    let mut rescuer = Disruptor::open(config(&ring.name).spin(false)).unwrap();
    assert!(!rescuer.commit(start, end).unwrap());

    {
        let mut bufs = rescuer.recover(abandoned.0, abandoned.1).unwrap();
        assert_eq!(bufs.num_elements(), 8);
        bufs.fill(0);
    }
    assert!(rescuer.commit(abandoned.0, abandoned.1).unwrap());
    assert!(survivor.commit(start, end).unwrap());
    assert_eq!(survivor.cursor().unwrap(), 12);
}
