// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sortwise: watch folders and file new arrivals into an AI-chosen tree
//!
//! Files that land in a watched folder are left alone until they stop
//! growing, classified by name into `folder/subfolder`, moved under a target
//! root (or under their own folder in in-place mode), and recorded in a
//! capped ledger so the move can be undone.

pub mod classifier;
pub mod config;
pub mod error;
pub mod history;
pub mod mover;
pub mod oracle;
pub mod pipeline;
pub mod stability;
pub mod suppression;
pub mod undo;
pub mod watcher;

pub use config::AppConfig;
pub use error::{Result, SortError};
