use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use sys::InfoType;

use crate::sync::Mutex;

/// Number of 64 bit entropy words the kernel provides
const ENTROPY_WORD_COUNT: u64 = 4;

/// Process wide random number generator, seeded from kernel entropy on first use
pub struct RngManager {
    rng: Mutex<Option<ChaCha20Rng>>,
}

impl RngManager {
    pub const fn new() -> Self {
        RngManager {
            rng: Mutex::new(None),
        }
    }

    /// Creates an rng manager which does not use kernel entropy, so its output is reproducible
    pub fn from_seed(seed: [u8; 32]) -> Self {
        RngManager {
            rng: Mutex::new(Some(ChaCha20Rng::from_seed(seed))),
        }
    }

    fn seed_from_kernel() -> ChaCha20Rng {
        let mut seed = [0; 32];
        for (index, chunk) in (0..ENTROPY_WORD_COUNT).zip(seed.chunks_exact_mut(8)) {
            match sys::get_info(InfoType::RandomEntropy, index) {
                Ok(word) => chunk.copy_from_slice(&word.to_le_bytes()),
                Err(error) => panic!("failed to read kernel entropy: {error}"),
            }
        }

        log::debug!("seeded process rng from kernel entropy");
        ChaCha20Rng::from_seed(seed)
    }

    fn with_rng<R>(&self, f: impl FnOnce(&mut ChaCha20Rng) -> R) -> R {
        let mut rng = self.rng.lock();
        let rng = rng.get_or_insert_with(Self::seed_from_kernel);
        f(rng)
    }

    pub fn generate_random_u64(&self) -> u64 {
        self.with_rng(|rng| rng.next_u64())
    }

    pub fn generate_random_bytes(&self, dest: &mut [u8]) {
        self.with_rng(|rng| rng.fill_bytes(dest))
    }
}

impl Default for RngManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_managers_agree() {
        let a = RngManager::from_seed([3; 32]);
        let b = RngManager::from_seed([3; 32]);
        assert_eq!(a.generate_random_u64(), b.generate_random_u64());

        let mut bytes_a = [0; 13];
        let mut bytes_b = [0; 13];
        a.generate_random_bytes(&mut bytes_a);
        b.generate_random_bytes(&mut bytes_b);
        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn kernel_seeded_manager_produces_output() {
        let rng = RngManager::new();
        let values: [u64; 4] = core::array::from_fn(|_| rng.generate_random_u64());
        assert!(values.iter().any(|&value| value != values[0]));
    }
}
