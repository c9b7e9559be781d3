//! Differential state publishing
//!
//! Mirrors machine status to the pendant, sending each field only when it
//! changes (or when explicitly refreshed).

mod fields;
mod tracked;

pub use fields::{AxisField, FieldError, Format, Reading, ScalarField, Shape};
pub use tracked::{FrameSink, PublishError, Tracked, TrackedArray, TrackedValue};
