//! Philox4x32-10 counter-based generator.
//!
//! The key is fixed by the seed; every block call encrypts the 128-bit
//! counter and then increments it, yielding four 32-bit words. Output is
//! fully determined by (key, counter), so the state is two small arrays that
//! can be checkpointed as plain bytes.

use bytemuck::{Pod, Zeroable};

use accelrt_core::error::{AccelError, Result};

const PHILOX_M0: u32 = 0xD251_1F53;
const PHILOX_M1: u32 = 0xCD9E_8D57;
const PHILOX_W0: u32 = 0x9E37_79B9;
const PHILOX_W1: u32 = 0xBB67_AE85;
const ROUNDS: usize = 10;

/// 2^-24, the spacing of f32 values produced from the top 24 bits of a word.
const F32_STEP: f32 = 1.0 / (1u32 << 24) as f32;

/// Raw generator state (24 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct PhiloxState {
    /// 128-bit block counter.
    pub counter: [u32; 4],
    /// 64-bit key derived from the seed.
    pub key: [u32; 2],
}

// SAFETY: #[repr(C)] with only u32 arrays, no padding.
unsafe impl Zeroable for PhiloxState {}
unsafe impl Pod for PhiloxState {}

impl PhiloxState {
    /// State for `seed` with the counter at zero.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            counter: [0; 4],
            key: [seed as u32, (seed >> 32) as u32],
        }
    }

    /// Encrypt the current counter and advance it by one block.
    pub fn next_block(&mut self) -> [u32; 4] {
        let mut ctr = self.counter;
        let mut key = self.key;

        for round in 0..ROUNDS {
            mix(&mut ctr, &key);
            if round + 1 < ROUNDS {
                key[0] = key[0].wrapping_add(PHILOX_W0);
                key[1] = key[1].wrapping_add(PHILOX_W1);
            }
        }

        self.advance(1);
        ctr
    }

    /// Advance the counter by `blocks` without producing output.
    pub fn advance(&mut self, blocks: u64) {
        let mut carry = blocks;
        for word in self.counter.iter_mut() {
            if carry == 0 {
                break;
            }
            let sum = *word as u64 + (carry & 0xFFFF_FFFF);
            *word = sum as u32;
            carry = (carry >> 32) + (sum >> 32);
        }
    }
}

#[inline]
fn mix(ctr: &mut [u32; 4], key: &[u32; 2]) {
    let p0 = ctr[0] as u64 * PHILOX_M0 as u64;
    let p1 = ctr[2] as u64 * PHILOX_M1 as u64;

    *ctr = [
        (p1 >> 32) as u32 ^ ctr[1] ^ key[0],
        p1 as u32,
        (p0 >> 32) as u32 ^ ctr[3] ^ key[1],
        p0 as u32,
    ];
}

/// Buffered Philox word stream with float sampling.
#[derive(Debug, Clone)]
pub struct Philox {
    state: PhiloxState,
    block: [u32; 4],
    cursor: usize,
}

impl Philox {
    /// Generator seeded with `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::from_state(PhiloxState::from_seed(seed))
    }

    /// Resume from a checkpointed state.
    #[must_use]
    pub fn from_state(state: PhiloxState) -> Self {
        Self {
            state,
            block: [0; 4],
            cursor: 4,
        }
    }

    /// Current state. Words buffered from the last block are not included.
    #[must_use]
    pub fn state(&self) -> PhiloxState {
        self.state
    }

    /// Next 32-bit word.
    pub fn next_u32(&mut self) -> u32 {
        if self.cursor == 4 {
            self.block = self.state.next_block();
            self.cursor = 0;
        }
        let word = self.block[self.cursor];
        self.cursor += 1;
        word
    }

    /// Uniform f32 in `[0, 1)`.
    pub fn next_uniform(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 * F32_STEP
    }

    /// Uniform f32 in `(0, 1]`, safe to pass to `ln`.
    fn next_open_low(&mut self) -> f32 {
        ((self.next_u32() >> 8) + 1) as f32 * F32_STEP
    }

    /// Two independent Normal(mean, stddev²) samples via Box-Muller.
    pub fn next_normal_pair(&mut self, mean: f32, stddev: f32) -> (f32, f32) {
        let u1 = self.next_open_low();
        let u2 = self.next_uniform();

        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f32::consts::PI * u2;

        (mean + stddev * r * theta.cos(), mean + stddev * r * theta.sin())
    }

    /// Fill `out` with uniform values in `[0, 1)`.
    pub fn fill_uniform(&mut self, out: &mut [f32]) {
        for v in out.iter_mut() {
            *v = self.next_uniform();
        }
    }

    /// Fill `out` with normal samples. The length must be even.
    pub fn fill_normal(&mut self, out: &mut [f32], mean: f32, stddev: f32) -> Result<()> {
        if out.len() % 2 != 0 {
            return Err(AccelError::RandomGen(format!(
                "normal generation requires an even count, got {}",
                out.len()
            )));
        }
        for pair in out.chunks_exact_mut(2) {
            let (a, b) = self.next_normal_pair(mean, stddev);
            pair[0] = a;
            pair[1] = b;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_pod() {
        assert_eq!(std::mem::size_of::<PhiloxState>(), 24);
        let state = PhiloxState::from_seed(0x0123_4567_89AB_CDEF);
        let bytes: &[u8] = bytemuck::bytes_of(&state);
        let back: PhiloxState = *bytemuck::from_bytes(bytes);
        assert_eq!(back, state);
    }

    #[test]
    fn test_reproducible() {
        let mut a = Philox::new(42);
        let mut b = Philox::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = Philox::new(42);
        let mut b = Philox::new(43);
        let same = (0..16).all(|_| a.next_u32() == b.next_u32());
        assert!(!same, "different seeds should produce different sequences");
    }

    #[test]
    fn test_resume_from_state() {
        let mut a = Philox::new(7);
        for _ in 0..8 {
            a.next_u32();
        }
        let mut b = Philox::from_state(a.state());
        assert_eq!(a.next_u32(), b.next_u32());
    }

    #[test]
    fn test_advance_carries() {
        let mut state = PhiloxState {
            counter: [u32::MAX, u32::MAX, 0, 0],
            key: [0, 0],
        };
        state.advance(1);
        assert_eq!(state.counter, [0, 0, 1, 0]);

        let mut state = PhiloxState::default();
        state.advance(1 << 32);
        assert_eq!(state.counter, [0, 1, 0, 0]);
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = Philox::new(12345);
        for _ in 0..10_000 {
            let u = rng.next_uniform();
            assert!((0.0..1.0).contains(&u), "uniform out of range: {}", u);
        }
    }

    #[test]
    fn test_uniform_mean() {
        let mut rng = Philox::new(99);
        let mut buf = vec![0f32; 20_000];
        rng.fill_uniform(&mut buf);
        let mean: f64 = buf.iter().map(|&v| v as f64).sum::<f64>() / buf.len() as f64;
        assert!((mean - 0.5).abs() < 0.02, "mean {} should be near 0.5", mean);
    }

    #[test]
    fn test_normal_moments() {
        let mut rng = Philox::new(2024);
        let mut buf = vec![0f32; 20_000];
        rng.fill_normal(&mut buf, 3.0, 2.0).unwrap();

        let n = buf.len() as f64;
        let mean: f64 = buf.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var: f64 = buf.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        assert!((mean - 3.0).abs() < 0.1, "mean {}", mean);
        assert!((var.sqrt() - 2.0).abs() < 0.1, "stddev {}", var.sqrt());
        assert!(buf.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_normal_rejects_odd_count() {
        let mut rng = Philox::new(1);
        let mut buf = vec![0f32; 5];
        let err = rng.fill_normal(&mut buf, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, AccelError::RandomGen(_)));
    }
}
