mod arbitration;
pub use arbitration::*;
mod debug;
pub use debug::*;
mod ipc;
pub use ipc::*;
mod memory;
pub use memory::*;
mod sync;
pub use sync::*;
mod thread;
pub use thread::*;
