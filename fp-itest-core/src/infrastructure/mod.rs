pub mod allocator;
pub mod config;
pub mod devnet;
pub mod lifecycle;
pub mod logging;
pub mod poll;
pub mod rpc;
pub mod storage;
