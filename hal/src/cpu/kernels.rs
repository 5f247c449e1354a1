//! rayon implementations of the four stage contracts.

use crate::context::Geometry;
use heq_core::LutParams;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Words handled by one histogram worker before merging into the shared table.
const HISTOGRAM_CHUNK_WORDS: usize = 1 << 14;

/// Block length of the two-level scan.
const SCAN_BLOCK: usize = 1024;

/// Level of sample `i` within a packed word.
#[inline]
fn sample(word: u32, i: usize, bits: u32, mask: u32) -> u32 {
    (word >> (i as u32 * bits)) & mask
}

fn snapshot(words: &[AtomicU32]) -> Vec<u32> {
    words.par_iter().map(|w| w.load(Ordering::Relaxed)).collect()
}

/// Count samples per level into `histogram`.
///
/// Each worker fills a private table for its chunk and merges it with atomic
/// adds, so bins shared between workers never lose an update.
pub fn histogram(image: &[AtomicU32], histogram: &[AtomicU32], geometry: &Geometry) {
    let depth = geometry.depth;
    let per_word = depth.samples_per_word();
    let bits = depth.bits();
    let mask = depth.max_level();
    let pixels = geometry.pixel_count as usize;
    let levels = depth.levels();

    image
        .par_chunks(HISTOGRAM_CHUNK_WORDS)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let mut local = vec![0u32; levels];
            let base = chunk_idx * HISTOGRAM_CHUNK_WORDS * per_word;
            for (w, word) in chunk.iter().enumerate() {
                let word = word.load(Ordering::Relaxed);
                for i in 0..per_word {
                    if base + w * per_word + i < pixels {
                        local[sample(word, i, bits, mask) as usize] += 1;
                    }
                }
            }
            for (bin, count) in histogram.iter().zip(local) {
                if count > 0 {
                    bin.fetch_add(count, Ordering::Relaxed);
                }
            }
        });
}

/// Inclusive prefix sum of `histogram` into `cumulative`.
pub fn cumulative(histogram: &[AtomicU32], cumulative: &[AtomicU32]) {
    let values = snapshot(histogram);

    let block_totals: Vec<u32> = values.par_chunks(SCAN_BLOCK).map(|b| b.iter().sum()).collect();
    let offsets: Vec<u32> = block_totals
        .iter()
        .scan(0u32, |acc, &total| {
            let start = *acc;
            *acc += total;
            Some(start)
        })
        .collect();

    values
        .par_chunks(SCAN_BLOCK)
        .zip(cumulative.par_chunks(SCAN_BLOCK))
        .zip(offsets.par_iter())
        .for_each(|((src, dst), &offset)| {
            let mut running = offset;
            for (s, d) in src.iter().zip(dst) {
                running += s;
                d.store(running, Ordering::Relaxed);
            }
        });
}

/// Rescale the cumulative table into the lookup table.
pub fn normalize(cumulative: &[AtomicU32], lut: &[AtomicU32], geometry: &Geometry) {
    let values = snapshot(cumulative);
    let params = LutParams::new(&values, geometry.depth, geometry.pixel_count, geometry.mode);

    values
        .par_iter()
        .zip(lut.par_iter())
        .for_each(|(&c, out)| out.store(params.map(c), Ordering::Relaxed));
}

/// Remap every sample through the lookup table.
///
/// One worker owns each output word, so no two workers write the same word.
pub fn back_project(image: &[AtomicU32], lut: &[AtomicU32], output: &[AtomicU32], geometry: &Geometry) {
    let depth = geometry.depth;
    let per_word = depth.samples_per_word();
    let bits = depth.bits();
    let mask = depth.max_level();
    let pixels = geometry.pixel_count as usize;
    let table = snapshot(lut);

    image
        .par_iter()
        .zip(output.par_iter())
        .enumerate()
        .for_each(|(w, (src, dst))| {
            let word = src.load(Ordering::Relaxed);
            let mut out = 0u32;
            for i in 0..per_word {
                if w * per_word + i < pixels {
                    let mapped = table[sample(word, i, bits, mask) as usize] & mask;
                    out |= mapped << (i as u32 * bits);
                }
            }
            dst.store(out, Ordering::Relaxed);
        });
}
