//! ember-graph: a fixed-capacity render graph for Vulkan
//!
//! Passes declare the named attachments they read and write; the graph
//! discovers the subset of passes the terminal `"final"` pass depends on,
//! orders them, places layout-transition barriers where attachments cross
//! pass boundaries, and manages the native render passes, framebuffers and
//! per-frame command buffers behind them.
//!
//! The graph core is backend-agnostic: it drives any
//! [`RenderBackend`](backend::RenderBackend) implementation, with
//! [`backend::vulkan::VulkanBackend`] as the ash-based production backend.
//!
//! ```no_run
//! use ember_graph::backend::{RenderBackend, TextureFormat};
//! use ember_graph::graph::{AttachmentInfo, RenderGraph};
//!
//! fn declare(graph: &mut RenderGraph, backend: &mut dyn RenderBackend)
//!     -> Result<(), ember_graph::graph::GraphError>
//! {
//!     graph.add_pass("shadow", false)?;
//!     graph.add_output_with(
//!         backend,
//!         "shadow",
//!         "shadow_map",
//!         &AttachmentInfo::depth(TextureFormat::Depth32Float),
//!     )?;
//!
//!     graph.add_pass("final", true)?;
//!     graph.add_input(
//!         "final",
//!         "shadow_map",
//!     )?;
//!
//!     graph.build(backend)
//! }
//! ```

pub mod backend;
pub mod graph;

pub use backend::{BackendError, BackendResult, RenderBackend};
pub use graph::{AttachmentInfo, GraphError, GraphResult, RenderGraph, MAX_PASSES, TERMINAL_PASS};
