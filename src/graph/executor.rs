//! Per-frame command recording
//!
//! Owns one command pool and one primary buffer per compiled pass. Buffers
//! are allocated lazily on first use and reused every frame; the pool is
//! reset wholesale between frames instead of resetting buffers one by one.

use crate::backend::{
    AttachmentKind, BarrierKind, ClearValue, CommandBufferHandle, CommandPoolHandle,
    RenderBackend,
};
use crate::graph::attachment::AttachmentRegistry;
use crate::graph::pass::PassTable;
use crate::graph::schedule::CompiledNode;
use crate::graph::{GraphError, GraphResult};

pub struct Executor {
    pool: Option<CommandPoolHandle>,
    buffers: Vec<CommandBufferHandle>,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            pool: None,
            buffers: Vec::new(),
        }
    }

    /// Make sure one command buffer exists per compiled pass
    fn ensure_buffers(
        &mut self,
        backend: &mut dyn RenderBackend,
        passes: &mut PassTable,
        compiled: &[CompiledNode],
    ) -> GraphResult<CommandPoolHandle> {
        let pool = match self.pool {
            Some(pool) => pool,
            None => {
                let pool = backend.create_command_pool()?;
                self.pool = Some(pool);
                pool
            }
        };

        if self.buffers.len() != compiled.len() {
            if !self.buffers.is_empty() {
                backend.free_command_buffers(pool, &self.buffers);
                self.buffers.clear();
            }
            self.buffers = backend.allocate_command_buffers(pool, compiled.len() as u32)?;
            for (node, &buffer) in compiled.iter().zip(&self.buffers) {
                passes.entry_mut(node.pass_index).command_buffer = Some(buffer);
            }
        }

        Ok(pool)
    }

    /// Prepare for a new frame of recording: allocate if needed, reset the pool
    pub fn reset(
        &mut self,
        backend: &mut dyn RenderBackend,
        passes: &mut PassTable,
        compiled: &[CompiledNode],
    ) -> GraphResult<()> {
        let pool = self.ensure_buffers(backend, passes, compiled)?;
        backend.reset_command_pool(pool)?;
        Ok(())
    }

    /// Record one pass, identified by its position in the compiled order
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        backend: &mut dyn RenderBackend,
        passes: &mut PassTable,
        registry: &AttachmentRegistry,
        compiled: &[CompiledNode],
        order_index: usize,
        clear_values: &[ClearValue],
        frame_image_index: usize,
    ) -> GraphResult<()> {
        let Some(node) = compiled.get(order_index) else {
            log::error!(
                "execute: index {} out of compiled range {}",
                order_index,
                compiled.len()
            );
            return Err(GraphError::NotFound(format!(
                "compiled pass index {}",
                order_index
            )));
        };
        let node = *node;

        self.ensure_buffers(backend, passes, compiled)?;

        let entry = passes.entry_mut(node.pass_index);
        let buffer = entry
            .command_buffer
            .ok_or_else(|| GraphError::NotFound(format!("command buffer of '{}'", entry.id)))?;
        let render_pass = entry
            .render_pass
            .ok_or_else(|| GraphError::NotFound(format!("render pass of '{}'", entry.id)))?;

        let framebuffer_index = if entry.swapchain_output {
            frame_image_index
        } else {
            0
        };
        let framebuffer = entry
            .framebuffers
            .get(framebuffer_index)
            .copied()
            .ok_or_else(|| {
                GraphError::NotFound(format!(
                    "framebuffer {} of '{}'",
                    framebuffer_index, entry.id
                ))
            })?;

        // clear values are cached on first use and reused on later frames
        if entry.clear_values.is_none() {
            entry.clear_values = Some(clear_values.to_vec());
        }

        backend.begin_command_buffer(buffer)?;

        for input in &entry.inputs {
            if let Some(kind) = registry.barrier(input) {
                if let Some(attachment) = registry.lookup(input) {
                    let barrier = match kind {
                        AttachmentKind::Color => BarrierKind::ColorToShaderRead,
                        AttachmentKind::Depth => BarrierKind::DepthToShaderRead,
                    };
                    backend.cmd_attachment_barrier(buffer, attachment.image.texture, barrier);
                }
            }
        }

        let extent = backend.swapchain_extent();
        let cached = entry.clear_values.clone().unwrap_or_default();
        backend.cmd_begin_render_pass(buffer, render_pass, framebuffer, extent, &cached);

        if let Some(record) = entry.record.as_mut() {
            record(backend, buffer, framebuffer);
        }

        backend.cmd_end_render_pass(buffer);
        backend.end_command_buffer(buffer)?;

        Ok(())
    }

    /// Hand out the ordered buffer list
    ///
    /// An empty `out` is always filled; a non-empty one is only replaced
    /// when `refill` is set, so callers can fill once and reuse the list
    /// across frames. Submission itself is the caller's job.
    pub fn submit_list(
        &self,
        passes: &PassTable,
        compiled: &[CompiledNode],
        out: &mut Vec<CommandBufferHandle>,
        refill: bool,
    ) {
        if !refill && !out.is_empty() {
            return;
        }
        out.clear();
        for node in compiled {
            if let Some(buffer) = passes.entry(node.pass_index).command_buffer {
                out.push(buffer);
            } else {
                log::warn!(
                    "submit_list: pass '{}' has no recorded buffer",
                    passes.entry(node.pass_index).id
                );
            }
        }
    }

    /// Drop the compiled-order buffer assignment, e.g. after a rebuild
    /// changed the pass set; buffers are reallocated lazily
    pub fn invalidate(&mut self, backend: &mut dyn RenderBackend, passes: &mut PassTable) {
        if let Some(pool) = self.pool {
            if !self.buffers.is_empty() {
                backend.free_command_buffers(pool, &self.buffers);
            }
        }
        self.buffers.clear();
        let used: Vec<usize> = passes.used_indices().collect();
        for index in used {
            passes.entry_mut(index).command_buffer = None;
        }
    }

    /// Free all command state; safe to call repeatedly
    pub fn destroy(&mut self, backend: &mut dyn RenderBackend, passes: &mut PassTable) {
        self.invalidate(backend, passes);
        if let Some(pool) = self.pool.take() {
            backend.destroy_command_pool(pool);
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
