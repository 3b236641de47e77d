//! Application layer: state kept by an orchestrated run.

pub mod finality;
pub mod registry;

pub use finality::wait_for_finalized_span;
pub use registry::{InstanceRegistry, InstanceResources, RegisteredInstance};
