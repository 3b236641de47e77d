pub mod encoding;
pub mod random;
