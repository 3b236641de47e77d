pub mod api;
pub mod backend;
pub mod clients;
pub mod manager;
pub mod metrics;

pub use backend::Collaborators;
pub use manager::TestManager;
