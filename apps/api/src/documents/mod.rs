//! Resume upload and text extraction.

pub mod handlers;
pub mod parser;
