//! Non-conflicting resources for one test run: TCP ports, scratch directories and key names.
//!
//! Allocation failures are fatal to the calling setup step and are never retried by callers.

mod dirs;
mod keys;
mod ports;

pub use dirs::DirAllocator;
pub use keys::KeyNameAllocator;
pub use ports::PortAllocator;
