//! Test double for the backend seam
//!
//! Records every call the graph makes so tests can assert on object counts,
//! recording order and barrier placement without a GPU.
#![allow(dead_code)]

use ember_graph::backend::*;
use ember_graph::graph::{AttachmentInfo, RenderGraph};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct BeginRenderPass {
    pub buffer: CommandBufferHandle,
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    pub clear_values: Vec<ClearValue>,
}

pub struct MockBackend {
    pub extent: Extent2d,
    pub swapchain_views: Vec<TextureViewHandle>,
    next_id: u64,

    pub attachments: HashMap<u64, AttachmentDescriptor>,
    pub render_passes: HashMap<u64, RenderPassDescriptor>,
    pub framebuffers: HashMap<u64, FramebufferDescriptor>,
    pub live_pools: Vec<CommandPoolHandle>,
    pub live_buffers: Vec<CommandBufferHandle>,

    pub destroyed_attachments: usize,
    pub destroyed_render_passes: usize,
    pub destroyed_framebuffers: usize,
    pub pool_resets: usize,

    pub barriers: Vec<(CommandBufferHandle, TextureHandle, BarrierKind)>,
    pub begun: Vec<BeginRenderPass>,
    pub ended_render_passes: usize,
    pub begun_buffers: Vec<CommandBufferHandle>,
    pub ended_buffers: Vec<CommandBufferHandle>,
    pub submissions: Vec<Vec<CommandBufferHandle>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut mock = Self {
            extent: Extent2d::new(1280, 720),
            swapchain_views: Vec::new(),
            next_id: 1,
            attachments: HashMap::new(),
            render_passes: HashMap::new(),
            framebuffers: HashMap::new(),
            live_pools: Vec::new(),
            live_buffers: Vec::new(),
            destroyed_attachments: 0,
            destroyed_render_passes: 0,
            destroyed_framebuffers: 0,
            pool_resets: 0,
            barriers: Vec::new(),
            begun: Vec::new(),
            ended_render_passes: 0,
            begun_buffers: Vec::new(),
            ended_buffers: Vec::new(),
            submissions: Vec::new(),
        };
        mock.swapchain_views = (0..3).map(|_| TextureViewHandle(mock.fresh())).collect();
        mock
    }

    fn fresh(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn make_attachment(&mut self, desc: &AttachmentDescriptor) -> AttachmentImage {
        let texture = TextureHandle(self.fresh());
        self.attachments.insert(texture.0, desc.clone());
        AttachmentImage {
            texture,
            view: TextureViewHandle(self.fresh()),
            sampler: SamplerHandle(self.fresh()),
        }
    }

    /// Framebuffer descriptor the graph created `handle` with
    pub fn framebuffer(&self, handle: FramebufferHandle) -> &FramebufferDescriptor {
        &self.framebuffers[&handle.0]
    }
}

impl RenderBackend for MockBackend {
    fn swapchain_extent(&self) -> Extent2d {
        self.extent
    }

    fn swapchain_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn swapchain_image_views(&self) -> Vec<TextureViewHandle> {
        self.swapchain_views.clone()
    }

    fn create_color_attachment(
        &mut self,
        desc: &AttachmentDescriptor,
    ) -> BackendResult<AttachmentImage> {
        Ok(self.make_attachment(desc))
    }

    fn create_depth_attachment(
        &mut self,
        desc: &AttachmentDescriptor,
    ) -> BackendResult<AttachmentImage> {
        Ok(self.make_attachment(desc))
    }

    fn destroy_attachment(&mut self, attachment: AttachmentImage) {
        self.attachments.remove(&attachment.texture.0);
        self.destroyed_attachments += 1;
    }

    fn create_render_pass(
        &mut self,
        desc: &RenderPassDescriptor,
    ) -> BackendResult<RenderPassHandle> {
        let id = self.fresh();
        self.render_passes.insert(id, desc.clone());
        Ok(RenderPassHandle(id))
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) {
        self.render_passes.remove(&render_pass.0);
        self.destroyed_render_passes += 1;
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle> {
        let id = self.fresh();
        self.framebuffers.insert(id, desc.clone());
        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
        self.destroyed_framebuffers += 1;
    }

    fn create_command_pool(&mut self) -> BackendResult<CommandPoolHandle> {
        let pool = CommandPoolHandle(self.fresh());
        self.live_pools.push(pool);
        Ok(pool)
    }

    fn destroy_command_pool(&mut self, pool: CommandPoolHandle) {
        self.live_pools.retain(|&p| p != pool);
    }

    fn allocate_command_buffers(
        &mut self,
        _pool: CommandPoolHandle,
        count: u32,
    ) -> BackendResult<Vec<CommandBufferHandle>> {
        let buffers: Vec<CommandBufferHandle> = (0..count)
            .map(|_| CommandBufferHandle(self.fresh()))
            .collect();
        self.live_buffers.extend_from_slice(&buffers);
        Ok(buffers)
    }

    fn free_command_buffers(&mut self, _pool: CommandPoolHandle, buffers: &[CommandBufferHandle]) {
        self.live_buffers.retain(|b| !buffers.contains(b));
    }

    fn reset_command_pool(&mut self, _pool: CommandPoolHandle) -> BackendResult<()> {
        self.pool_resets += 1;
        Ok(())
    }

    fn begin_command_buffer(&mut self, buffer: CommandBufferHandle) -> BackendResult<()> {
        self.begun_buffers.push(buffer);
        Ok(())
    }

    fn end_command_buffer(&mut self, buffer: CommandBufferHandle) -> BackendResult<()> {
        self.ended_buffers.push(buffer);
        Ok(())
    }

    fn cmd_attachment_barrier(
        &mut self,
        buffer: CommandBufferHandle,
        texture: TextureHandle,
        barrier: BarrierKind,
    ) {
        self.barriers.push((buffer, texture, barrier));
    }

    fn cmd_begin_render_pass(
        &mut self,
        buffer: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        _render_area: Extent2d,
        clear_values: &[ClearValue],
    ) {
        self.begun.push(BeginRenderPass {
            buffer,
            render_pass,
            framebuffer,
            clear_values: clear_values.to_vec(),
        });
    }

    fn cmd_end_render_pass(&mut self, _buffer: CommandBufferHandle) {
        self.ended_render_passes += 1;
    }

    fn submit(&mut self, buffers: &[CommandBufferHandle]) -> BackendResult<()> {
        self.submissions.push(buffers.to_vec());
        Ok(())
    }

    fn wait_idle(&mut self) {}
}

/// shadow -> geometry -> final, the smallest graph with both barrier kinds
pub fn shadow_geometry_final(backend: &mut MockBackend) -> RenderGraph {
    let mut graph = RenderGraph::new();

    graph.add_pass("shadow", false).unwrap();
    graph
        .add_output_with(
            backend,
            "shadow",
            "shadow_map",
            &AttachmentInfo::depth(TextureFormat::Depth32Float),
        )
        .unwrap();

    graph.add_pass("geometry", false).unwrap();
    graph.add_input("geometry", "shadow_map").unwrap();
    graph
        .add_output_with(
            backend,
            "geometry",
            "color_tex1",
            &AttachmentInfo::color(TextureFormat::Rgba8Unorm),
        )
        .unwrap();
    graph
        .add_output_with(
            backend,
            "geometry",
            "depth_tex1",
            &AttachmentInfo::depth(TextureFormat::Depth32Float),
        )
        .unwrap();

    graph.add_pass("final", true).unwrap();
    graph.add_input("final", "color_tex1").unwrap();

    graph
}
