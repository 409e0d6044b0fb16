//! Decode: a two-team word-guessing party game served to the browser.

pub mod config;
pub mod error;
pub mod machine;
pub mod session;
pub mod stats;
pub mod types;
pub mod words;
