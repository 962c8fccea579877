//! CLI output rendering.

pub mod json;
pub mod markdown;
