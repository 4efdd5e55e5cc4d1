//! Render graph core
//!
//! A [`RenderGraph`] turns declared passes and named attachments into a
//! validated execution order, native render passes and framebuffers, and
//! per-frame recorded command buffers. The application declares passes with
//! [`RenderGraph::add_pass`] / [`RenderGraph::add_output_with`] and friends,
//! calls [`RenderGraph::build`] once, then per frame records each compiled
//! pass and submits the list returned by [`RenderGraph::submit_list`].

pub mod adjacency;
pub mod attachment;
pub mod builder;
pub mod executor;
pub mod framebuffer;
pub mod pass;
pub mod schedule;

pub use attachment::AttachmentInfo;
pub use pass::RecordCallback;
pub use schedule::CompiledNode;

use crate::backend::{BackendError, ClearValue, CommandBufferHandle, RenderBackend, RenderPassHandle};
use adjacency::{AdjacencyMatrix, NodeSet};
use attachment::AttachmentRegistry;
use builder::GraphBuilder;
use executor::Executor;
use framebuffer::FramebufferBuilder;
use pass::PassTable;
use thiserror::Error;

/// Hard cap on simultaneously registered passes and discovered nodes
pub const MAX_PASSES: usize = 64;

/// Name of the pass graph discovery walks backward from
pub const TERMINAL_PASS: &str = "final";

/// Render graph error type
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Capacity exhausted: {0}")]
    Capacity(String),
    #[error("Duplicate: {0}")]
    Duplicate(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unresolvable dependencies: {0}")]
    Unresolvable(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// The render graph: pass declarations, attachments, compiled schedule and
/// per-frame execution state
pub struct RenderGraph {
    passes: PassTable,
    registry: AttachmentRegistry,
    nodes: NodeSet,
    matrix: AdjacencyMatrix,
    compiled: Vec<CompiledNode>,
    executor: Executor,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            passes: PassTable::new(),
            registry: AttachmentRegistry::new(),
            nodes: NodeSet::new(),
            matrix: AdjacencyMatrix::new(),
            compiled: Vec::new(),
            executor: Executor::new(),
        }
    }

    /// Register a pass; `swapchain_output` passes render into the
    /// presentable swapchain images
    pub fn add_pass(&mut self, id: &str, swapchain_output: bool) -> GraphResult<()> {
        self.passes.add_pass(id, swapchain_output)?;
        Ok(())
    }

    /// Declare an input attachment that already exists in the registry
    pub fn add_input(&mut self, id: &str, attachment: &str) -> GraphResult<()> {
        let index = self.find_pass(id)?;
        if !self.registry.contains(attachment) {
            log::error!("add_input: attachment '{}' does not exist", attachment);
            return Err(GraphError::NotFound(format!("attachment '{}'", attachment)));
        }
        self.passes.push_input(index, attachment)
    }

    /// Declare an input attachment, creating it if needed
    ///
    /// The duplicate-name check runs before the registry is touched, so a
    /// rejected declaration never creates or rebuilds an attachment.
    pub fn add_input_with(
        &mut self,
        backend: &mut dyn RenderBackend,
        id: &str,
        attachment: &str,
        info: &AttachmentInfo,
    ) -> GraphResult<()> {
        let index = self.find_pass(id)?;
        self.passes.check_input_free(index, attachment)?;
        self.registry.get_or_create(backend, attachment, info)?;
        self.passes.push_input(index, attachment)
    }

    /// Declare an output attachment that already exists in the registry
    pub fn add_output(&mut self, id: &str, attachment: &str) -> GraphResult<()> {
        let index = self.find_pass(id)?;
        if !self.registry.contains(attachment) {
            log::error!("add_output: attachment '{}' does not exist", attachment);
            return Err(GraphError::NotFound(format!("attachment '{}'", attachment)));
        }
        self.passes.push_output(index, attachment)
    }

    /// Declare an output attachment, creating it if needed
    ///
    /// The duplicate-name check runs before the registry is touched, so a
    /// rejected declaration never creates or rebuilds an attachment.
    pub fn add_output_with(
        &mut self,
        backend: &mut dyn RenderBackend,
        id: &str,
        attachment: &str,
        info: &AttachmentInfo,
    ) -> GraphResult<()> {
        let index = self.find_pass(id)?;
        self.passes.check_output_free(index, attachment)?;
        self.registry.get_or_create(backend, attachment, info)?;
        self.passes.push_output(index, attachment)
    }

    /// Attach the per-frame recording callback; a missing pass is logged
    pub fn set_record_callback(&mut self, id: &str, callback: RecordCallback) {
        self.passes.set_record_callback(id, callback);
    }

    /// Discover, schedule and materialize the graph
    ///
    /// Walks backward from the terminal pass, topologically orders the
    /// discovered subgraph, then builds native render passes and
    /// framebuffers. On failure the previously compiled schedule and
    /// barrier table stay in place; the new ones are only committed once
    /// every step succeeded. May be called again after declaration changes.
    pub fn build(&mut self, backend: &mut dyn RenderBackend) -> GraphResult<()> {
        let barriers = GraphBuilder {
            passes: &self.passes,
            registry: &self.registry,
            nodes: &mut self.nodes,
            matrix: &mut self.matrix,
        }
        .discover()?;

        let compiled = schedule::schedule(&self.nodes, &self.matrix)?;

        FramebufferBuilder {
            passes: &mut self.passes,
            registry: &self.registry,
        }
        .build(backend, &compiled)?;

        self.registry.replace_barriers(barriers);
        self.compiled = compiled;
        self.executor.invalidate(backend, &mut self.passes);
        log::debug!("graph built: {} passes", self.compiled.len());
        Ok(())
    }

    /// Native render pass handle of a built pass, for pipeline creation
    pub fn native_render_pass(&self, id: &str) -> GraphResult<RenderPassHandle> {
        let index = self.find_pass(id)?;
        self.passes.entry(index).render_pass.ok_or_else(|| {
            log::error!("pass '{}' has not been built", id);
            GraphError::NotFound(format!("render pass of '{}' (not built)", id))
        })
    }

    pub fn compiled_pass_count(&self) -> usize {
        self.compiled.len()
    }

    /// Compiled order as `(pass id, stage)` pairs
    pub fn compiled_order(&self) -> Vec<(&str, u32)> {
        self.compiled
            .iter()
            .map(|node| (self.passes.entry(node.pass_index).id.as_str(), node.stage))
            .collect()
    }

    /// Prepare command buffers for a new frame; allocates them lazily on the
    /// first call and resets the pool on every call
    pub fn reset_command_buffers(&mut self, backend: &mut dyn RenderBackend) -> GraphResult<()> {
        self.executor
            .reset(backend, &mut self.passes, &self.compiled)
    }

    /// Record one pass by its position in the compiled order
    pub fn execute_pass(
        &mut self,
        backend: &mut dyn RenderBackend,
        clear_values: &[ClearValue],
        index: usize,
        frame_image_index: usize,
    ) -> GraphResult<()> {
        self.executor.execute(
            backend,
            &mut self.passes,
            &self.registry,
            &self.compiled,
            index,
            clear_values,
            frame_image_index,
        )
    }

    /// Record one pass by id
    pub fn execute_pass_by_id(
        &mut self,
        backend: &mut dyn RenderBackend,
        clear_values: &[ClearValue],
        id: &str,
        frame_image_index: usize,
    ) -> GraphResult<()> {
        let pass_index = self.find_pass(id)?;
        let Some(order_index) = self
            .compiled
            .iter()
            .position(|node| node.pass_index == pass_index)
        else {
            log::error!("pass '{}' is not part of the compiled order", id);
            return Err(GraphError::NotFound(format!(
                "pass '{}' in compiled order",
                id
            )));
        };
        self.execute_pass(backend, clear_values, order_index, frame_image_index)
    }

    /// Collect the recorded buffers in compiled order for submission
    pub fn submit_list(&self, out: &mut Vec<CommandBufferHandle>, refill: bool) {
        self.executor
            .submit_list(&self.passes, &self.compiled, out, refill);
    }

    /// Regenerate all framebuffers after a swapchain resize
    ///
    /// The swapchain and any extent-dependent attachments must have been
    /// rebuilt by the caller first.
    pub fn rebuild_framebuffers(&mut self, backend: &mut dyn RenderBackend) -> GraphResult<()> {
        FramebufferBuilder {
            passes: &mut self.passes,
            registry: &self.registry,
        }
        .rebuild_framebuffers(backend)
    }

    /// Release every GPU object the graph owns; safe to call repeatedly
    pub fn destroy(&mut self, backend: &mut dyn RenderBackend) {
        self.executor.destroy(backend, &mut self.passes);

        let used: Vec<usize> = self.passes.used_indices().collect();
        for index in used {
            let entry = self.passes.entry_mut(index);
            for framebuffer in entry.framebuffers.drain(..) {
                backend.destroy_framebuffer(framebuffer);
            }
            if let Some(render_pass) = entry.render_pass.take() {
                backend.destroy_render_pass(render_pass);
            }
        }

        self.registry.clear(backend);
        self.compiled.clear();
        self.nodes.clear();
        self.matrix.clear();
    }

    fn find_pass(&self, id: &str) -> GraphResult<usize> {
        self.passes.find(id).ok_or_else(|| {
            log::error!("pass '{}' not found", id);
            GraphError::NotFound(format!("pass '{}'", id))
        })
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}
