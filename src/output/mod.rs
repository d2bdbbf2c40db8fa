//! Output writers for analysis reports.
//!
//! This module handles:
//! - JSON reports (write, read back)
//! - Text summaries for the terminal

pub mod json;
pub mod summary;

// Re-export main functions
pub use json::{read_report, report_to_string, validate_path, write_report};
pub use summary::generate_text_summary;
