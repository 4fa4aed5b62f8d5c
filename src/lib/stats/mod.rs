pub mod host;
pub mod memory;
