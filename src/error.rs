// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Sortwise

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Sortwise operations
pub type Result<T> = std::result::Result<T, SortError>;

/// Sortwise error types
#[derive(Error, Debug)]
pub enum SortError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("No free name for {name} in {dir:?} after {attempts} attempts")]
    CollisionExhausted {
        dir: PathBuf,
        name: String,
        attempts: u32,
    },

    #[error("Source does not exist: {0:?}")]
    SourceMissing(PathBuf),

    #[error("Destination already occupied: {0:?}")]
    DestinationOccupied(PathBuf),

    #[error("Invalid path: {0:?}")]
    InvalidPath(PathBuf),
}
