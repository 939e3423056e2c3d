//! Deterministic transform blocks with a natural-looking spectrum: energy
//! falls off with frequency and the high bands are mostly noise.

use crate::coding::block::Channel;
use crate::engine::TransformBlock;

const SHAPES: [(u8, u8); 6] = [(3, 3), (2, 2), (4, 4), (3, 2), (5, 5), (2, 3)];

struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12345);
        self.0 >> 16
    }

    /// Uniform in `-spread..=spread`.
    fn centered(&mut self, spread: i32) -> i32 {
        if spread == 0 {
            return 0;
        }
        (self.next() % (2 * spread as u32 + 1)) as i32 - spread
    }
}

pub fn synthetic_block(
    channel: Channel,
    log2_w: u8,
    log2_h: u8,
    amplitude: i32,
    seed: u32,
) -> TransformBlock {
    let mut rng = Lcg(seed ^ 0x9E37_79B9);
    let w = 1usize << log2_w;
    let coefficients = (0..1usize << (log2_w + log2_h))
        .map(|i| {
            let (x, y) = (i % w, i / w);
            let envelope = amplitude / (1 + x * x + y * y) as i32;
            let value = envelope + rng.centered(envelope / 2 + 24);
            if rng.next() & 1 == 0 {
                value
            } else {
                -value
            }
        })
        .collect();
    TransformBlock {
        channel,
        log2_w,
        log2_h,
        is_intra: true,
        coefficients,
    }
}

/// `num_tiles` tiles of `blocks_per_tile` intra blocks cycling through
/// luma, luma, cb, cr and a fixed set of shapes.
pub fn synthetic_tiles(num_tiles: usize, blocks_per_tile: usize, seed: u32) -> Vec<Vec<TransformBlock>> {
    let mut rng = Lcg(seed);
    (0..num_tiles)
        .map(|_| {
            (0..blocks_per_tile)
                .map(|b| {
                    let channel = match b % 4 {
                        0 | 1 => Channel::Luma,
                        2 => Channel::Cb,
                        _ => Channel::Cr,
                    };
                    let (log2_w, log2_h) = SHAPES[rng.next() as usize % SHAPES.len()];
                    let amplitude = 200 + (rng.next() % 4000) as i32;
                    synthetic_block(channel, log2_w, log2_h, amplitude, rng.next())
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(synthetic_tiles(3, 5, 7), synthetic_tiles(3, 5, 7));
        assert_ne!(synthetic_tiles(3, 5, 7), synthetic_tiles(3, 5, 8));
    }

    #[test]
    fn test_blocks_are_valid() {
        for tile in synthetic_tiles(4, 8, 1) {
            assert_eq!(tile.len(), 8);
            for block in tile {
                assert!(block.validate().is_ok());
            }
        }
    }

    #[test]
    fn test_energy_falls_with_frequency() {
        let block = synthetic_block(Channel::Luma, 4, 4, 4000, 3);
        let low: i64 = block.coefficients[..4].iter().map(|c| c.abs() as i64).sum();
        let high: i64 = block.coefficients[252..].iter().map(|c| c.abs() as i64).sum();
        assert!(low > high);
    }
}
