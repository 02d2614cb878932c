//! Sprocket Core
//!
//! Allocation primitives and ambient utilities shared by the sprocket crates.

pub mod alloc;
pub mod logging;
pub mod profiling;
