//! Analysis Layer
//!
//! Turns recognized label text into structured additive codes.

pub mod additives;

pub use additives::{dedup_codes, extract_codes, AdditiveCode};
