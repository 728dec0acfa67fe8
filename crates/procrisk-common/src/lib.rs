//! Common types and pure logic for procrisk
//!
//! This crate provides the data model shared by the procrisk engine: raw
//! counter snapshots, interval delta math, risk scoring and the fixed-schema
//! endpoint report.

pub mod platform;
pub mod report;
pub mod risk;
pub mod sample;
pub mod sampling;

pub use platform::*;
pub use report::*;
pub use risk::*;
pub use sample::*;
pub use sampling::*;
