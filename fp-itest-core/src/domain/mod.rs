pub mod committee;
pub mod model;
pub mod service_state;
pub mod vote;

pub use committee::*;
pub use model::*;
pub use service_state::*;
pub use vote::*;
