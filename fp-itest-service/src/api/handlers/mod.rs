pub mod health;
pub mod keys;
pub mod metrics;
pub mod status;
