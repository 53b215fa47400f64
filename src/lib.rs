pub mod agent;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod memory;
pub mod prompts;
pub mod router;
pub mod tools;
pub mod webhook;

pub use error::{Error, Result};
pub use router::{ChatRouter, Upload};
