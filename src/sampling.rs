//! Negative-sampling and subsampling tables, built once at initialization
//! and read-only afterwards.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::real;

/// Seed for the deterministic unigram-table shuffle. The shuffle lets each
/// worker thread consume the table sequentially from a private cursor and
/// still draw an unbiased sample stream.
const SHUFFLE_SEED: u64 = 495;

/// The unigram negative-sampling table: word ids appear with multiplicity
/// proportional to `freq^0.75`.
#[derive(Default)]
pub struct UnigramTable {
    table: Vec<u32>,
}

impl UnigramTable {
    pub fn new(word_freq: &[u64], size: usize) -> UnigramTable {
        const POWER: f64 = 0.75;
        let train_words_pow: f64 = word_freq.iter().map(|&f| (f as f64).powf(POWER)).sum();

        let mut table = Vec::with_capacity(size);
        let mut i = 0;
        let mut d1 = (word_freq[0] as f64).powf(POWER) / train_words_pow;
        for a in 0..size {
            table.push(i as u32);
            if a as f64 / size as f64 > d1 {
                i += 1;
                if i < word_freq.len() {
                    d1 += (word_freq[i] as f64).powf(POWER) / train_words_pow;
                }
            }
            if i >= word_freq.len() {
                i = word_freq.len() - 1;
            }
        }

        table.shuffle(&mut StdRng::seed_from_u64(SHUFFLE_SEED));
        UnigramTable { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Draws the next sample, advancing the caller's private cursor. The
    /// table itself is immutable, so concurrent readers need no locking.
    pub fn sample(&self, cursor: &mut usize) -> usize {
        let word = self.table[*cursor] as usize;
        *cursor += 1;
        if *cursor == self.table.len() {
            *cursor = 0;
        }
        word
    }
}

/// Per-word keep thresholds for frequent-word subsampling. A token is kept
/// as a training center iff a fresh uniform(0,1) draw is below its
/// threshold; a non-positive ratio disables subsampling entirely (every
/// in-vocabulary token kept). Zero-frequency words always have threshold 0.
#[derive(Default)]
pub struct SubsamplingTable {
    threshold: Vec<real>,
}

impl SubsamplingTable {
    pub fn new(word_freq: &[u64], ratio: f64, total_words: u64) -> SubsamplingTable {
        let k = ratio * total_words as f64;
        let threshold = word_freq
            .iter()
            .map(|&f| {
                if f == 0 {
                    0.0
                } else if k <= 0.0 {
                    1.0
                } else {
                    let f = f as f64;
                    (((f / k).sqrt() + 1.0) * k / f) as real
                }
            })
            .collect();
        SubsamplingTable { threshold }
    }

    pub fn threshold(&self, widx: usize) -> real {
        self.threshold[widx]
    }

    pub fn keep(&self, widx: usize, draw: real) -> bool {
        draw < self.threshold[widx]
    }
}
