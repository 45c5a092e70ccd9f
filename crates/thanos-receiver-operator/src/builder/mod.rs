//! Builders for the metadata shared by every object the operator owns.
pub mod meta;
