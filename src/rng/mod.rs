//! Seeded random numbers for permutation nulls
//!
//! Mersenne-Twister with R's `set.seed()` initialisation and R's rejection
//! sampling for integer draws, so a seed reproduces the same permutations as
//! `set.seed(seed); sample(n)` in R 3.6 or later.

/// Mersenne-Twister generator seeded the way R seeds it
#[derive(Clone)]
pub struct RMersenneTwister {
    state: [u32; 624],
    index: usize,
}

impl RMersenneTwister {
    const N: usize = 624;
    const M: usize = 397;
    const MATRIX_A: u32 = 0x9908_B0DF;
    const UPPER_MASK: u32 = 0x8000_0000;
    const LOWER_MASK: u32 = 0x7FFF_FFFF;
    const TO_UNIT: f64 = 2.328_306_436_538_696_3e-10;

    /// State filled from the LCG `x = 69069 x + 1`: 50 warm-up draws, one
    /// draw for the position word, then 624 state words
    pub fn new(seed: u32) -> Self {
        let mut lcg = seed;
        for _ in 0..51 {
            lcg = lcg.wrapping_mul(69069).wrapping_add(1);
        }
        let mut state = [0u32; 624];
        for word in state.iter_mut() {
            lcg = lcg.wrapping_mul(69069).wrapping_add(1);
            *word = lcg;
        }
        Self { state, index: Self::N }
    }

    fn generate_numbers(&mut self) {
        for i in 0..Self::N {
            let y = (self.state[i] & Self::UPPER_MASK) | (self.state[(i + 1) % Self::N] & Self::LOWER_MASK);
            self.state[i] = self.state[(i + Self::M) % Self::N] ^ (y >> 1);
            if y & 1 != 0 {
                self.state[i] ^= Self::MATRIX_A;
            }
        }
        self.index = 0;
    }

    fn next_u32(&mut self) -> u32 {
        if self.index >= Self::N {
            self.generate_numbers();
        }
        let mut y = self.state[self.index];
        self.index += 1;

        y ^= y >> 11;
        y ^= (y << 7) & 0x9D2C_5680;
        y ^= (y << 15) & 0xEFC6_0000;
        y ^= y >> 18;
        y
    }

    /// Uniform draw in the open interval (0, 1)
    pub fn runif(&mut self) -> f64 {
        let u = self.next_u32() as f64 * Self::TO_UNIT;
        if u <= 0.0 {
            0.5 * Self::TO_UNIT
        } else if u >= 1.0 {
            1.0 - 0.5 * Self::TO_UNIT
        } else {
            u
        }
    }

    /// `bits` random bits assembled from 16-bit chunks of uniform draws
    fn rbits(&mut self, bits: u32) -> u64 {
        let mut v: u64 = 0;
        let mut n = 0;
        while n <= bits {
            let chunk = (self.runif() * 65536.0).floor() as u64;
            v = v.wrapping_mul(65536).wrapping_add(chunk);
            n += 16;
        }
        v & ((1u64 << bits) - 1)
    }

    /// Uniform index in `0..n` by rejection from the next power of two
    pub fn unif_index(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let bits = (n as f64).log2().ceil() as u32;
        loop {
            let v = self.rbits(bits);
            if (v as usize) < n {
                return v as usize;
            }
        }
    }

    /// Random permutation of `0..n`, the zero-based equivalent of R's `sample(n)`
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..n).collect();
        let mut out = Vec::with_capacity(n);
        let mut remaining = n;
        for _ in 0..n {
            let j = self.unif_index(remaining);
            out.push(pool[j]);
            remaining -= 1;
            pool[j] = pool[remaining];
        }
        out
    }

    /// Reorder `values` by a fresh permutation
    pub fn shuffle<T: Copy>(&mut self, values: &[T]) -> Vec<T> {
        self.permutation(values.len()).into_iter().map(|i| values[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runif_matches_r() {
        // set.seed(2); runif(5)
        let expected = [0.1848822599, 0.7023740360, 0.5733263348, 0.1680519204, 0.9438393388];
        let mut rng = RMersenneTwister::new(2);
        for exp in expected {
            assert!((rng.runif() - exp).abs() < 1e-9);
        }
    }

    #[test]
    fn test_permutation_matches_r_sample() {
        // set.seed(42); sample(10)
        let mut rng = RMersenneTwister::new(42);
        let perm: Vec<usize> = rng.permutation(10).into_iter().map(|i| i + 1).collect();
        assert_eq!(perm, vec![1, 5, 10, 8, 2, 4, 6, 9, 7, 3]);

        // set.seed(1); sample(5)
        let mut rng = RMersenneTwister::new(1);
        let perm: Vec<usize> = rng.permutation(5).into_iter().map(|i| i + 1).collect();
        assert_eq!(perm, vec![1, 4, 3, 5, 2]);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = RMersenneTwister::new(7);
        let mut shuffled = rng.shuffle(&[3, 1, 4, 1, 5, 9, 2, 6]);
        shuffled.sort();
        assert_eq!(shuffled, vec![1, 1, 2, 3, 4, 5, 6, 9]);
        assert!(rng.shuffle::<u8>(&[]).is_empty());
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = RMersenneTwister::new(123);
        let mut b = RMersenneTwister::new(123);
        assert_eq!(a.permutation(50), b.permutation(50));
    }
}
