//! Named attachment registry
//!
//! Every GPU image the graph renders into or samples from is owned here and
//! referenced by name. Passes never manage attachment lifetime themselves.

use crate::backend::{
    AddressMode, AttachmentDescriptor, AttachmentImage, AttachmentKind, BorderColor,
    RenderBackend, TextureFormat,
};
use crate::graph::GraphResult;
use std::collections::HashMap;

/// Parameters for creating a named attachment
#[derive(Debug, Clone)]
pub struct AttachmentInfo {
    pub kind: AttachmentKind,
    pub format: TextureFormat,
    pub address_modes: [AddressMode; 3],
    pub border_color: BorderColor,
}

impl AttachmentInfo {
    pub fn color(format: TextureFormat) -> Self {
        Self {
            kind: AttachmentKind::Color,
            format,
            address_modes: [AddressMode::ClampToEdge; 3],
            border_color: BorderColor::default(),
        }
    }

    pub fn depth(format: TextureFormat) -> Self {
        Self {
            kind: AttachmentKind::Depth,
            format,
            address_modes: [AddressMode::ClampToEdge; 3],
            border_color: BorderColor::default(),
        }
    }
}

/// A registered attachment and the GPU objects backing it
pub struct Attachment {
    pub kind: AttachmentKind,
    pub info: AttachmentInfo,
    pub image: AttachmentImage,
}

/// Owner of all named attachments, plus the barrier side-table
///
/// The barrier table records which attachments cross a pass boundary during
/// the current build; the executor consults it to insert layout transitions
/// before a consuming pass samples them.
pub struct AttachmentRegistry {
    attachments: HashMap<String, Attachment>,
    barriers: HashMap<String, AttachmentKind>,
}

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self {
            attachments: HashMap::new(),
            barriers: HashMap::new(),
        }
    }

    /// Create the attachment if absent, sized to the current swapchain extent
    ///
    /// An existing attachment whose kind no longer matches `info` is destroyed
    /// and rebuilt; otherwise the existing one is kept as-is.
    pub fn get_or_create(
        &mut self,
        backend: &mut dyn RenderBackend,
        name: &str,
        info: &AttachmentInfo,
    ) -> GraphResult<()> {
        if let Some(existing) = self.attachments.get(name) {
            if existing.kind == info.kind {
                return Ok(());
            }
            log::debug!("attachment '{}' changed kind, rebuilding", name);
            if let Some(old) = self.attachments.remove(name) {
                backend.destroy_attachment(old.image);
            }
        }

        let extent = backend.swapchain_extent();
        let desc = AttachmentDescriptor {
            label: Some(name.to_string()),
            format: info.format,
            width: extent.width,
            height: extent.height,
            address_modes: info.address_modes,
            border_color: info.border_color,
        };

        let image = match info.kind {
            AttachmentKind::Color => backend.create_color_attachment(&desc)?,
            AttachmentKind::Depth => backend.create_depth_attachment(&desc)?,
        };

        self.attachments.insert(
            name.to_string(),
            Attachment {
                kind: info.kind,
                info: info.clone(),
                image,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Attachment> {
        self.attachments.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attachments.contains_key(name)
    }

    /// Install the barrier table of a freshly committed build, replacing
    /// the previous one wholesale
    pub fn replace_barriers(&mut self, barriers: HashMap<String, AttachmentKind>) {
        self.barriers = barriers;
    }

    /// The layout transition pending for `name`, if any
    pub fn barrier(&self, name: &str) -> Option<AttachmentKind> {
        self.barriers.get(name).copied()
    }

    /// Destroy every registered attachment; safe to call repeatedly
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for (_, attachment) in self.attachments.drain() {
            backend.destroy_attachment(attachment.image);
        }
        self.barriers.clear();
    }
}

impl Default for AttachmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
