pub mod artifacts;
pub mod upload;
