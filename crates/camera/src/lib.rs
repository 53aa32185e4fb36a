//! Trigcam camera contracts.
//!
//! This crate contains the frame type, the camera registry, and the
//! `FrameSource` boundary that vendor SDK adapters implement. The capture
//! engine only talks to cameras through these types.

pub mod frame;
pub mod registry;
pub mod source;

pub use frame::*;
pub use registry::*;
pub use source::*;
