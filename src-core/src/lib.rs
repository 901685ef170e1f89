pub mod clients;
pub mod config;
mod error;
pub mod jobs;
pub mod keychain;
pub mod log;
pub mod orchestrator;
pub mod session;
mod sync;
#[cfg(test)]
mod testing;

pub use error::Error;
