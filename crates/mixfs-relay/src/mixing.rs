//! Decoy padding and shuffling of a flushed batch.
//!
//! Both take a `CryptoRng`: an observer who can feed a relay and watch its
//! output order must not be able to recover the generator state.

use mixfs_common::types::DECOY_PAYLOAD;
use rand::{CryptoRng, Rng, RngCore};

/// One datagram waiting for the next flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardJob {
    /// Destination `host:port`.
    pub next_hop: String,
    /// Bytes to send, already re-framed for the next hop.
    pub payload: Vec<u8>,
}

impl ForwardJob {
    /// A decoy addressed to `next_hop`.
    #[must_use]
    pub fn decoy(next_hop: impl Into<String>) -> Self {
        Self {
            next_hop: next_hop.into(),
            payload: DECOY_PAYLOAD.to_vec(),
        }
    }
}

/// Appends between `0` and `2n - 1` decoys to a batch of `n` real jobs,
/// each sent to a uniformly chosen known relay. Returns how many were
/// added.
///
/// An empty batch or an empty relay list gets no decoys.
pub fn add_decoys<R>(batch: &mut Vec<ForwardJob>, known_relays: &[String], rng: &mut R) -> usize
where
    R: RngCore + CryptoRng,
{
    if batch.is_empty() || known_relays.is_empty() {
        return 0;
    }
    let count = rng.gen_range(0..2 * batch.len());
    batch.reserve(count);
    for _ in 0..count {
        let target = &known_relays[rng.gen_range(0..known_relays.len())];
        batch.push(ForwardJob::decoy(target.as_str()));
    }
    count
}

/// Fisher–Yates shuffle.
pub fn shuffle<T, R>(items: &mut [T], rng: &mut R)
where
    R: RngCore + CryptoRng,
{
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn jobs(n: usize) -> Vec<ForwardJob> {
        (0..n)
            .map(|i| ForwardJob {
                next_hop: format!("h{i}:1"),
                payload: vec![b'a'; i + 1],
            })
            .collect()
    }

    fn relays() -> Vec<String> {
        vec!["r1:5100".to_string(), "r2:5101".to_string()]
    }

    #[test]
    fn empty_batch_gets_no_decoys() {
        let mut batch = Vec::new();
        assert_eq!(add_decoys(&mut batch, &relays(), &mut OsRng), 0);
        assert!(batch.is_empty());
    }

    #[test]
    fn decoy_count_stays_below_twice_the_batch() {
        let mut seen_max = 0;
        for _ in 0..500 {
            let mut batch = jobs(3);
            let added = add_decoys(&mut batch, &relays(), &mut OsRng);
            assert!(added < 6);
            assert_eq!(batch.len(), 3 + added);
            seen_max = seen_max.max(added);
        }
        assert_eq!(seen_max, 5);
    }

    #[test]
    fn decoys_target_known_relays_with_sentinel() {
        let known = relays();
        let mut batch = jobs(50);
        let added = add_decoys(&mut batch, &known, &mut OsRng);
        for job in &batch[50..] {
            assert!(known.contains(&job.next_hop));
            assert_eq!(job.payload, b"0");
        }
        assert_eq!(batch.len() - 50, added);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let original = jobs(20);
        let mut shuffled = original.clone();
        shuffle(&mut shuffled, &mut OsRng);
        assert_eq!(shuffled.len(), original.len());
        for job in &original {
            assert!(shuffled.contains(job));
        }
    }

    #[test]
    fn shuffle_handles_tiny_slices() {
        let mut empty: [u8; 0] = [];
        shuffle(&mut empty, &mut OsRng);
        let mut one = [7];
        shuffle(&mut one, &mut OsRng);
        assert_eq!(one, [7]);
    }

    #[test]
    fn every_input_lands_everywhere_uniformly() {
        const N: usize = 4;
        const ROUNDS: usize = 20_000;
        let mut counts = [[0usize; N]; N];
        for _ in 0..ROUNDS {
            let mut items: Vec<usize> = (0..N).collect();
            shuffle(&mut items, &mut OsRng);
            for (pos, &item) in items.iter().enumerate() {
                counts[item][pos] += 1;
            }
        }
        let expected = ROUNDS / N;
        for row in counts {
            for c in row {
                // roughly seven standard deviations
                assert!(c.abs_diff(expected) < 450, "skewed count {c}, expected ~{expected}");
            }
        }
    }
}
