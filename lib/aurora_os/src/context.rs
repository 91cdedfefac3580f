use bit_utils::Size;
use sys::{MemoryPermission, SysErr};
use thiserror_no_std::Error;

use crate::addr_space::{AslrError, AslrSpaceManager};
use crate::RngManager;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Failed to read process address space layout: {0}")]
    AddressSpaceLayout(#[from] SysErr),
}

/// Process wide state used by the randomized parts of the library
///
/// Usually there is one per process, reached with [`this_context`](crate::this_context).
pub struct Context {
    rng: RngManager,
    aslr: AslrSpaceManager,
}

impl Context {
    pub fn new() -> Result<Self, InitError> {
        Ok(Context {
            rng: RngManager::new(),
            aslr: AslrSpaceManager::new()?,
        })
    }

    /// Creates a context whose random choices are reproducible
    pub fn with_seed(seed: [u8; 32]) -> Result<Self, InitError> {
        Ok(Context {
            rng: RngManager::from_seed(seed),
            aslr: AslrSpaceManager::new()?,
        })
    }

    pub fn rng(&self) -> &RngManager {
        &self.rng
    }

    pub fn aslr(&self) -> &AslrSpaceManager {
        &self.aslr
    }

    /// Maps fresh memory of `size` at a random address in the aslr region
    pub fn map_at_random_address(&self, size: Size, permission: MemoryPermission) -> Result<usize, AslrError> {
        self.aslr.map_memory(&self.rng, size, permission)
    }
}
