//! Backend-agnostic value types shared between the render graph and its backends

use crate::backend::traits::{RenderPassHandle, TextureViewHandle};

/// A 2D extent in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    /// Check if this is a depth format
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }
}

/// Sampler address mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    ClampToBorder,
    Repeat,
    MirrorRepeat,
}

/// Sampler border color, used with [`AddressMode::ClampToBorder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderColor {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Whether an attachment holds color or depth data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Color,
    Depth,
}

/// Parameters for building one named attachment texture
#[derive(Debug, Clone)]
pub struct AttachmentDescriptor {
    pub label: Option<String>,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    /// Address modes for the u, v and w axes of the attachment's sampler
    pub address_modes: [AddressMode; 3],
    pub border_color: BorderColor,
}

/// Layout transition inserted when an attachment crosses a pass boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierKind {
    /// color-attachment-optimal -> shader-read-only
    ColorToShaderRead,
    /// depth-attachment-optimal -> shader-read-only
    DepthToShaderRead,
}

/// Description of a single-subpass native render pass
///
/// Load op is always "don't care" and store op is always "store"; the
/// external-to-subpass dependencies are derived from which attachments are
/// present (color-attachment-output stages for color, early/late fragment
/// test stages for depth).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_format: Option<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    /// The color attachment is a presentable swapchain image
    pub swapchain_output: bool,
}

/// Description of a framebuffer bound to a native render pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDescriptor {
    pub render_pass: RenderPassHandle,
    pub attachments: Vec<TextureViewHandle>,
    pub extent: Extent2d,
}

/// Clear value for one attachment of a render pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}
