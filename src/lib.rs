//! Credit aligner library

pub mod cli;
pub mod clustering;
pub mod config;
pub mod edge_cases;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod matching;
pub mod processing;
pub mod scoring;

pub use config::Config;
pub use engine::{AlignmentEngine, AlignmentResult};
pub use error::{CreditAlignerError, Result};
