//! Backend abstraction layer
//!
//! The [`traits::RenderBackend`] trait is the seam between the render graph
//! and the GPU; [`vulkan`] provides the ash-based implementation.

pub mod traits;
pub mod types;
pub mod vulkan;

pub use traits::*;
pub use types::*;
