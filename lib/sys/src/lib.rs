//! The sys crate is a low level interface to the kernel primitives used by the aurora os libraries
//! 
//! On hosted targets the kernel side of every syscall is emulated in process by the private `kernel` module,
//! so the libraries built on top of this crate behave the same way they would on the real kernel:
//! threads really block, handles really get signaled, and waits really time out or get cancelled.

pub mod config;
pub mod flags;
pub use flags::*;
mod handle;
pub use handle::*;
mod kernel;
mod syscalls;
pub use syscalls::*;
mod syserr;
pub use syserr::*;
mod tlr;
pub use tlr::ThreadLocalRegion;
