//! Client-side view of the server stream.
//!
//! - `display` — renders server messages as human-readable lines.
pub mod display;
