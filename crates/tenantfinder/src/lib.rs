pub mod agent;
pub mod aggregate;
mod error;
pub mod output;
pub mod ratelimit;
pub mod registry;
pub mod runner;
pub mod session;
pub mod sources;
pub mod stats;
pub mod utils;

pub use error::{Error, Result};
