//! Userspace synchronization primitives, the multi wait engine and address space randomization for aurora processes
//!
//! Everything here is built directly on the kernel primitives exposed by the `sys` crate:
//! lock words arbitrated by the kernel, address waits, kernel events and memory queries.

#![cfg_attr(not(test), no_std)]

pub mod addr_space;
pub mod config;
mod context;
pub mod multi_wait;
mod rng;
pub mod sync;
pub mod time;

pub use context::{Context, InitError};
pub use rng::RngManager;

static THIS_CONTEXT: spin::Once<Context> = spin::Once::new();

/// Initializes the context of the current process if it has not been initialized yet
pub fn init() -> Result<&'static Context, InitError> {
    THIS_CONTEXT.try_call_once(Context::new)
}

/// Returns the context of the current process, initializing it on first use
///
/// # Panics
///
/// panics if the context has to be initialized and that fails
pub fn this_context() -> &'static Context {
    match init() {
        Ok(context) => context,
        Err(error) => panic!("failed to initialize process context: {error}"),
    }
}
