pub mod signing;

pub use signing::HttpSigningClient;
