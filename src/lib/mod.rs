#[macro_use]
extern crate lazy_static;
extern crate tracing;

pub mod cli;
pub mod helper;
pub mod logger;
pub mod server;
pub mod stats;
pub mod weather;
