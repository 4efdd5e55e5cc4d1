//! Native render pass and framebuffer generation
//!
//! Runs once per build (and again on resize): every compiled pass gets a
//! single-subpass native render pass derived from its outputs, plus one
//! framebuffer per swapchain image for swapchain-output passes or exactly
//! one for offscreen passes.

use crate::backend::{
    AttachmentKind, Extent2d, FramebufferDescriptor, FramebufferHandle, RenderBackend,
    RenderPassDescriptor, RenderPassHandle, TextureFormat, TextureViewHandle,
};
use crate::graph::attachment::AttachmentRegistry;
use crate::graph::pass::PassTable;
use crate::graph::schedule::CompiledNode;
use crate::graph::{GraphError, GraphResult};

pub struct FramebufferBuilder<'a> {
    pub passes: &'a mut PassTable,
    pub registry: &'a AttachmentRegistry,
}

impl FramebufferBuilder<'_> {
    /// Build render passes and framebuffers for every compiled pass
    pub fn build(
        &mut self,
        backend: &mut dyn RenderBackend,
        compiled: &[CompiledNode],
    ) -> GraphResult<()> {
        self.destroy_framebuffers(backend);

        for node in compiled {
            let old_render_pass = self.passes.entry_mut(node.pass_index).render_pass.take();
            if let Some(render_pass) = old_render_pass {
                backend.destroy_render_pass(render_pass);
            }

            let (descriptor, offscreen_views) = self.describe(backend, node.pass_index)?;
            let render_pass = backend.create_render_pass(&descriptor)?;

            let framebuffers = Self::generate_framebuffers(
                backend,
                render_pass,
                descriptor.swapchain_output,
                &offscreen_views,
            )?;

            let entry = self.passes.entry_mut(node.pass_index);
            entry.render_pass = Some(render_pass);
            entry.framebuffers = framebuffers;
        }

        Ok(())
    }

    /// Regenerate framebuffers only, e.g. after the swapchain and the
    /// registry attachments were rebuilt at a new extent
    pub fn rebuild_framebuffers(&mut self, backend: &mut dyn RenderBackend) -> GraphResult<()> {
        self.destroy_framebuffers(backend);

        let built: Vec<usize> = self
            .passes
            .used_indices()
            .filter(|&i| self.passes.entry(i).render_pass.is_some())
            .collect();

        for index in built {
            let entry = self.passes.entry(index);
            let render_pass = entry.render_pass.ok_or_else(|| {
                GraphError::NotFound(format!("render pass of '{}'", entry.id))
            })?;
            let swapchain_output = entry.swapchain_output;
            let offscreen_views = self.output_views(index)?;

            let framebuffers = Self::generate_framebuffers(
                backend,
                render_pass,
                swapchain_output,
                &offscreen_views,
            )?;
            self.passes.entry_mut(index).framebuffers = framebuffers;
        }

        Ok(())
    }

    fn destroy_framebuffers(&mut self, backend: &mut dyn RenderBackend) {
        let used: Vec<usize> = self.passes.used_indices().collect();
        for index in used {
            let framebuffers: Vec<FramebufferHandle> =
                self.passes.entry_mut(index).framebuffers.drain(..).collect();
            for framebuffer in framebuffers {
                backend.destroy_framebuffer(framebuffer);
            }
        }
    }

    /// Derive the render pass description and the offscreen attachment views
    /// (color first, then depth) from a pass's declared outputs
    fn describe(
        &self,
        backend: &mut dyn RenderBackend,
        pass_index: usize,
    ) -> GraphResult<(RenderPassDescriptor, Vec<TextureViewHandle>)> {
        let entry = self.passes.entry(pass_index);

        if entry.swapchain_output {
            return Ok((
                RenderPassDescriptor {
                    label: Some(entry.id.clone()),
                    color_format: Some(backend.swapchain_format()),
                    depth_format: None,
                    swapchain_output: true,
                },
                Vec::new(),
            ));
        }

        let mut color_format: Option<TextureFormat> = None;
        let mut depth_format: Option<TextureFormat> = None;
        let views = self.collect_output_views(pass_index, |kind, format| match kind {
            AttachmentKind::Color => {
                if color_format.is_none() {
                    color_format = Some(format);
                    true
                } else {
                    false
                }
            }
            AttachmentKind::Depth => {
                if depth_format.is_none() {
                    depth_format = Some(format);
                    true
                } else {
                    false
                }
            }
        })?;

        if color_format.is_none() && depth_format.is_none() {
            log::error!("pass '{}' declares no usable output attachment", entry.id);
            return Err(GraphError::NotFound(format!(
                "output attachments of pass '{}'",
                entry.id
            )));
        }

        Ok((
            RenderPassDescriptor {
                label: Some(entry.id.clone()),
                color_format,
                depth_format,
                swapchain_output: false,
            },
            views,
        ))
    }

    /// Current registry views for a pass's outputs, color first then depth
    fn output_views(&self, pass_index: usize) -> GraphResult<Vec<TextureViewHandle>> {
        let mut have_color = false;
        let mut have_depth = false;
        self.collect_output_views(pass_index, |kind, _| match kind {
            AttachmentKind::Color => {
                if have_color {
                    false
                } else {
                    have_color = true;
                    true
                }
            }
            AttachmentKind::Depth => {
                if have_depth {
                    false
                } else {
                    have_depth = true;
                    true
                }
            }
        })
    }

    fn collect_output_views(
        &self,
        pass_index: usize,
        mut keep: impl FnMut(AttachmentKind, TextureFormat) -> bool,
    ) -> GraphResult<Vec<TextureViewHandle>> {
        let entry = self.passes.entry(pass_index);
        let mut color_view: Option<TextureViewHandle> = None;
        let mut depth_view: Option<TextureViewHandle> = None;

        for output in &entry.outputs {
            let Some(attachment) = self.registry.lookup(output) else {
                log::error!(
                    "pass '{}' outputs unregistered attachment '{}'",
                    entry.id,
                    output
                );
                return Err(GraphError::NotFound(format!("attachment '{}'", output)));
            };
            if keep(attachment.kind, attachment.info.format) {
                match attachment.kind {
                    AttachmentKind::Color => color_view = Some(attachment.image.view),
                    AttachmentKind::Depth => depth_view = Some(attachment.image.view),
                }
            }
        }

        // attachment order matches the render pass description: color, depth
        Ok(color_view.into_iter().chain(depth_view).collect())
    }

    fn generate_framebuffers(
        backend: &mut dyn RenderBackend,
        render_pass: RenderPassHandle,
        swapchain_output: bool,
        offscreen_views: &[TextureViewHandle],
    ) -> GraphResult<Vec<FramebufferHandle>> {
        let extent: Extent2d = backend.swapchain_extent();

        if swapchain_output {
            let mut framebuffers = Vec::new();
            for view in backend.swapchain_image_views() {
                framebuffers.push(backend.create_framebuffer(&FramebufferDescriptor {
                    render_pass,
                    attachments: vec![view],
                    extent,
                })?);
            }
            Ok(framebuffers)
        } else {
            let framebuffer = backend.create_framebuffer(&FramebufferDescriptor {
                render_pass,
                attachments: offscreen_views.to_vec(),
                extent,
            })?;
            Ok(vec![framebuffer])
        }
    }
}
