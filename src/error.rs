// src/error.rs
use std::io;
use thiserror::Error;

// Re-export anyhow's Result type
pub use anyhow::Result;

/// Custom Error type for the runstats library
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Other error: {0}")]
    Other(String),
}
