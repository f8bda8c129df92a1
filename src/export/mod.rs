//! Exports of the enriched document and the blended element stream.
//!
//! * [`markdown`]: readable reports
//! * [`csv`]: one CSV file per detected table
//! * [`pdf`]: Markdown typeset into a PDF

pub mod csv;
pub mod markdown;
pub mod pdf;
