//! R-compatible Random Number Generator
//!
//! This module implements R's Mersenne Twister RNG with R's specific seeding
//! algorithm, plus R's rejection-sampling `R_unif_index()`, so that a seed
//! passed in the configuration selects the same relabelings on every run.

use std::collections::HashSet;

/// R's Mersenne Twister RNG
///
/// This implementation matches R's Mersenne-Twister RNG as defined in RNG.c.
/// R uses a 624-element state array with Matsumoto and Nishimura's algorithm.
pub struct RMersenneTwister {
    state: [u32; 624],
    index: usize,
}

impl RMersenneTwister {
    const N: usize = 624;
    const M: usize = 397;
    const MATRIX_A: u32 = 0x9908B0DF;
    const UPPER_MASK: u32 = 0x80000000;
    const LOWER_MASK: u32 = 0x7FFFFFFF;

    /// 1 / 2^32, R's scaling of a 32-bit draw to (0, 1)
    const I2_32M1: f64 = 2.3283064365386963e-10;

    /// Create a new RNG with the same seed as R's set.seed()
    ///
    /// R's set.seed() uses a Linear Congruential Generator (LCG) with
    /// multiplier 69069 to initialize the Mersenne-Twister state.
    /// This is NOT the standard MT init_genrand!
    pub fn new(seed: u32) -> Self {
        let mut mt = RMersenneTwister {
            state: [0; Self::N],
            index: Self::N,
        };
        mt.r_init_seed(seed);
        mt
    }

    /// Initialize MT state using R's algorithm from RNG.c Setseed():
    /// warm the LCG up 50 times, discard one value, then fill the state.
    fn r_init_seed(&mut self, seed: u32) {
        let mut r_i1: u32 = seed;

        for _ in 0..50 {
            r_i1 = r_i1.wrapping_mul(69069).wrapping_add(1);
        }

        r_i1 = r_i1.wrapping_mul(69069).wrapping_add(1);

        for i in 0..Self::N {
            r_i1 = r_i1.wrapping_mul(69069).wrapping_add(1);
            self.state[i] = r_i1;
        }

        self.index = Self::N;
    }

    /// Generate the next 624 words of the state array
    fn generate_numbers(&mut self) {
        for i in 0..Self::N {
            let y = (self.state[i] & Self::UPPER_MASK)
                | (self.state[(i + 1) % Self::N] & Self::LOWER_MASK);
            self.state[i] = self.state[(i + Self::M) % Self::N] ^ (y >> 1);
            if y & 1 != 0 {
                self.state[i] ^= Self::MATRIX_A;
            }
        }
        self.index = 0;
    }

    /// Generate a random 32-bit integer
    fn next_u32(&mut self) -> u32 {
        if self.index >= Self::N {
            self.generate_numbers();
        }

        let mut y = self.state[self.index];
        self.index += 1;

        // Tempering
        y ^= y >> 11;
        y ^= (y << 7) & 0x9D2C5680;
        y ^= (y << 15) & 0xEFC60000;
        y ^= y >> 18;

        y
    }

    /// Generate uniform random number in (0, 1)
    ///
    /// R: fixup(2.3283064365386963e-10 * (double) genrand_int32())
    pub fn runif(&mut self) -> f64 {
        let u = self.next_u32();
        let mut result = u as f64 * Self::I2_32M1;

        if result <= 0.0 {
            result = 0.5 * Self::I2_32M1;
        }
        if result >= 1.0 {
            result = 1.0 - 0.5 * Self::I2_32M1;
        }
        result
    }

    /// R's rbits(): assemble `bits` random bits from 16-bit chunks of runif()
    fn rbits(&mut self, bits: u32) -> u64 {
        let mut v: u64 = 0;
        let mut n = 0;
        while n <= bits {
            let v1 = (self.runif() * 65536.0).floor() as u64;
            v = v.wrapping_mul(65536).wrapping_add(v1);
            n += 16;
        }
        if bits >= 64 {
            v
        } else {
            v & ((1u64 << bits) - 1)
        }
    }

    /// Uniform integer in `[0, dn)` by rejection sampling
    /// R equivalent: R_unif_index() with sample.kind = "Rejection"
    pub fn unif_index(&mut self, dn: u64) -> u64 {
        if dn == 0 {
            return 0;
        }
        let bits = (dn as f64).log2().ceil() as u32;
        loop {
            let dv = self.rbits(bits);
            if dv < dn {
                return dv;
            }
        }
    }

    /// Draw `m` distinct integers from `[0, n)`, returned in ascending order
    ///
    /// Uses Floyd's algorithm so memory is O(m) even when `n` is huge.
    pub fn sample_distinct(&mut self, n: u64, m: u64) -> Vec<u64> {
        let m = m.min(n);
        let mut chosen: HashSet<u64> = HashSet::with_capacity(m as usize);
        for j in (n - m)..n {
            let t = self.unif_index(j + 1);
            if !chosen.insert(t) {
                chosen.insert(j);
            }
        }
        let mut out: Vec<u64> = chosen.into_iter().collect();
        out.sort_unstable();
        out
    }
}
