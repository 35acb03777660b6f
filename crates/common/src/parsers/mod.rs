//! Structured log-line parsing (C1's parsing half).
//!
//! Two profiles are supported, matching the two request formats a typical
//! HTTP front-end emits: `combined` and `combined_time` (combined plus a
//! trailing request-duration field).

pub mod combined;

pub use combined::{parse_line, LogFormat};
