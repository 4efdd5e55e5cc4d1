//! Core backend abstraction traits
//!
//! The render graph never talks to the GPU directly; everything it needs is
//! expressed through [`RenderBackend`]. The Vulkan implementation lives in
//! [`crate::backend::vulkan`], and tests drive the graph with a mock.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create swapchain: {0}")]
    SwapchainCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create render pass: {0}")]
    RenderPassCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Command recording failed: {0}")]
    CommandRecordingFailed(String),
    #[error("Queue submission failed: {0}")]
    SubmitFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub u64);

/// Handle to a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub u64);

/// Handle to a native render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassHandle(pub u64);

/// Handle to a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u64);

/// Handle to a command pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandPoolHandle(pub u64);

/// Handle to a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferHandle(pub u64);

/// The GPU objects backing one named attachment: image, view and sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentImage {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub sampler: SamplerHandle,
}

/// Everything the render graph consumes from the GPU layer
///
/// The trait groups the four collaborator services the graph depends on:
/// the swapchain provider, the attachment texture service, native
/// render-pass/framebuffer creation, and the command/queue service.
pub trait RenderBackend {
    // --- Swapchain provider ---

    /// Current swapchain extent
    fn swapchain_extent(&self) -> Extent2d;

    /// Current surface format
    fn swapchain_format(&self) -> TextureFormat;

    /// Views of the current swapchain images, one per presentable image
    fn swapchain_image_views(&self) -> Vec<TextureViewHandle>;

    // --- Attachment texture service ---

    /// Build a color attachment texture (color-attachment + sampled usage)
    fn create_color_attachment(
        &mut self,
        desc: &AttachmentDescriptor,
    ) -> BackendResult<AttachmentImage>;

    /// Build a depth attachment texture (depth-stencil + sampled usage)
    fn create_depth_attachment(
        &mut self,
        desc: &AttachmentDescriptor,
    ) -> BackendResult<AttachmentImage>;

    /// Destroy an attachment's image, view and sampler
    fn destroy_attachment(&mut self, attachment: AttachmentImage);

    // --- Render pass / framebuffer creation ---

    fn create_render_pass(&mut self, desc: &RenderPassDescriptor)
        -> BackendResult<RenderPassHandle>;

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle);

    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor)
        -> BackendResult<FramebufferHandle>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    // --- Command / queue service ---

    fn create_command_pool(&mut self) -> BackendResult<CommandPoolHandle>;

    fn destroy_command_pool(&mut self, pool: CommandPoolHandle);

    fn allocate_command_buffers(
        &mut self,
        pool: CommandPoolHandle,
        count: u32,
    ) -> BackendResult<Vec<CommandBufferHandle>>;

    fn free_command_buffers(&mut self, pool: CommandPoolHandle, buffers: &[CommandBufferHandle]);

    /// Reset the whole pool; cheaper than resetting buffers one by one
    fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> BackendResult<()>;

    fn begin_command_buffer(&mut self, buffer: CommandBufferHandle) -> BackendResult<()>;

    fn end_command_buffer(&mut self, buffer: CommandBufferHandle) -> BackendResult<()>;

    /// Record a layout-transition barrier for an attachment texture
    fn cmd_attachment_barrier(
        &mut self,
        buffer: CommandBufferHandle,
        texture: TextureHandle,
        barrier: BarrierKind,
    );

    fn cmd_begin_render_pass(
        &mut self,
        buffer: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        render_area: Extent2d,
        clear_values: &[ClearValue],
    );

    fn cmd_end_render_pass(&mut self, buffer: CommandBufferHandle);

    /// Submit an ordered list of recorded buffers to the graphics queue
    fn submit(&mut self, buffers: &[CommandBufferHandle]) -> BackendResult<()>;

    fn wait_idle(&mut self);
}
