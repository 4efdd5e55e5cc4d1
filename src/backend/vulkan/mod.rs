//! Vulkan backend implementation using ash
//!
//! Implements [`RenderBackend`] on top of a single graphics queue. Resources
//! handed to the graph are stored in maps keyed by opaque `u64` handles so the
//! graph never sees raw Vulkan objects.

use crate::backend::traits::*;
use crate::backend::types::*;
use ash::khr::{surface, swapchain};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::HashMap;
use std::sync::Arc;

/// Vulkan implementation of [`RenderBackend`]
pub struct VulkanBackend {
    _entry: ash::Entry,
    instance: ash::Instance,
    surface_fn: surface::Instance,
    swapchain_fn: swapchain::Device,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    graphics_queue: vk::Queue,
    graphics_queue_family: u32,
    allocator: Option<Arc<Mutex<Allocator>>>,

    // Swapchain
    swapchain: vk::SwapchainKHR,
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
    swapchain_view_handles: Vec<TextureViewHandle>,
    swapchain_format: vk::Format,
    swapchain_extent: vk::Extent2D,
    vsync: bool,

    // Resource storage
    textures: HashMap<u64, VkAttachmentTexture>,
    texture_views: HashMap<u64, vk::ImageView>,
    samplers: HashMap<u64, vk::Sampler>,
    render_passes: HashMap<u64, vk::RenderPass>,
    framebuffers: HashMap<u64, vk::Framebuffer>,
    command_pools: HashMap<u64, vk::CommandPool>,
    command_buffers: HashMap<u64, VkCommandBuffer>,

    // Handle counters
    next_texture_id: u64,
    next_view_id: u64,
    next_sampler_id: u64,
    next_render_pass_id: u64,
    next_framebuffer_id: u64,
    next_pool_id: u64,
    next_buffer_id: u64,
}

struct VkAttachmentTexture {
    image: vk::Image,
    allocation: Option<Allocation>,
}

struct VkCommandBuffer {
    buffer: vk::CommandBuffer,
    pool: u64,
}

impl VulkanBackend {
    /// Create the backend from raw window handles
    pub fn new(
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> BackendResult<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let app_name = c"ember-graph";

            let app_info = vk::ApplicationInfo {
                p_application_name: app_name.as_ptr(),
                application_version: vk::make_api_version(0, 1, 0, 0),
                p_engine_name: app_name.as_ptr(),
                engine_version: vk::make_api_version(0, 1, 0, 0),
                api_version: vk::API_VERSION_1_2,
                ..Default::default()
            };

            let extensions = ash_window::enumerate_required_extensions(display_handle)
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
                .to_vec();

            let instance_info = vk::InstanceCreateInfo {
                p_application_info: &app_info,
                enabled_extension_count: extensions.len() as u32,
                pp_enabled_extension_names: extensions.as_ptr(),
                ..Default::default()
            };

            let instance = entry
                .create_instance(&instance_info, None)
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let surface_fn = surface::Instance::new(&entry, &instance);
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle,
                window_handle,
                None,
            )
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let physical_device = physical_devices
                .into_iter()
                .find(|&pd| Self::find_queue_family(&instance, pd, &surface_fn, surface).is_some())
                .ok_or_else(|| {
                    BackendError::InitializationFailed("No suitable physical device".into())
                })?;

            let graphics_queue_family =
                Self::find_queue_family(&instance, physical_device, &surface_fn, surface)
                    .ok_or_else(|| {
                        BackendError::InitializationFailed("No suitable queue family".into())
                    })?;

            let queue_priorities = [1.0f32];
            let queue_info = vk::DeviceQueueCreateInfo {
                queue_family_index: graphics_queue_family,
                queue_count: 1,
                p_queue_priorities: queue_priorities.as_ptr(),
                ..Default::default()
            };

            let device_extensions = [swapchain::NAME.as_ptr()];
            let device_features = vk::PhysicalDeviceFeatures::default();

            let device_info = vk::DeviceCreateInfo {
                queue_create_info_count: 1,
                p_queue_create_infos: &queue_info,
                enabled_extension_count: device_extensions.len() as u32,
                pp_enabled_extension_names: device_extensions.as_ptr(),
                p_enabled_features: &device_features,
                ..Default::default()
            };

            let device = instance
                .create_device(physical_device, &device_info, None)
                .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

            let graphics_queue = device.get_device_queue(graphics_queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let swapchain_fn = swapchain::Device::new(&instance, &device);

            let mut backend = Self {
                _entry: entry,
                instance,
                surface_fn,
                swapchain_fn,
                surface,
                physical_device,
                device,
                graphics_queue,
                graphics_queue_family,
                allocator: Some(Arc::new(Mutex::new(allocator))),
                swapchain: vk::SwapchainKHR::null(),
                swapchain_images: Vec::new(),
                swapchain_image_views: Vec::new(),
                swapchain_view_handles: Vec::new(),
                swapchain_format: vk::Format::B8G8R8A8_SRGB,
                swapchain_extent: vk::Extent2D {
                    width: 0,
                    height: 0,
                },
                vsync,
                textures: HashMap::new(),
                texture_views: HashMap::new(),
                samplers: HashMap::new(),
                render_passes: HashMap::new(),
                framebuffers: HashMap::new(),
                command_pools: HashMap::new(),
                command_buffers: HashMap::new(),
                next_texture_id: 1,
                next_view_id: 1,
                next_sampler_id: 1,
                next_render_pass_id: 1,
                next_framebuffer_id: 1,
                next_pool_id: 1,
                next_buffer_id: 1,
            };

            backend.create_swapchain(width.max(1), height.max(1))?;

            Ok(backend)
        }
    }

    /// Recreate the swapchain, e.g. after a window resize
    ///
    /// Attachments and framebuffers referencing the old extent must be rebuilt
    /// by the caller afterwards.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            if let Err(e) = self.create_swapchain(width, height) {
                log::error!("swapchain recreation failed: {}", e);
            }
        }
    }

    fn find_queue_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Option<u32> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        for (index, family) in queue_families.iter().enumerate() {
            let supports_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let supports_surface = unsafe {
                surface_fn
                    .get_physical_device_surface_support(physical_device, index as u32, surface)
                    .unwrap_or(false)
            };

            if supports_graphics && supports_surface {
                return Some(index as u32);
            }
        }
        None
    }

    fn create_swapchain(&mut self, width: u32, height: u32) -> BackendResult<()> {
        unsafe {
            self.device.device_wait_idle().ok();

            for view in self.swapchain_image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            for handle in self.swapchain_view_handles.drain(..) {
                self.texture_views.remove(&handle.0);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_fn.destroy_swapchain(self.swapchain, None);
            }

            let capabilities = self
                .surface_fn
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            let formats = self
                .surface_fn
                .get_physical_device_surface_formats(self.physical_device, self.surface)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            let present_modes = self
                .surface_fn
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            let format = formats
                .iter()
                .find(|f| {
                    f.format == vk::Format::B8G8R8A8_SRGB
                        && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                })
                .unwrap_or(&formats[0]);

            let present_mode = if self.vsync {
                vk::PresentModeKHR::FIFO
            } else {
                present_modes
                    .iter()
                    .copied()
                    .find(|&m| m == vk::PresentModeKHR::MAILBOX)
                    .unwrap_or(vk::PresentModeKHR::FIFO)
            };

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: width.clamp(
                        capabilities.min_image_extent.width,
                        capabilities.max_image_extent.width,
                    ),
                    height: height.clamp(
                        capabilities.min_image_extent.height,
                        capabilities.max_image_extent.height,
                    ),
                }
            };

            let image_count = (capabilities.min_image_count + 1).min(
                if capabilities.max_image_count > 0 {
                    capabilities.max_image_count
                } else {
                    u32::MAX
                },
            );

            let swapchain_info = vk::SwapchainCreateInfoKHR {
                surface: self.surface,
                min_image_count: image_count,
                image_format: format.format,
                image_color_space: format.color_space,
                image_extent: extent,
                image_array_layers: 1,
                image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                image_sharing_mode: vk::SharingMode::EXCLUSIVE,
                pre_transform: capabilities.current_transform,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                present_mode,
                clipped: vk::TRUE,
                ..Default::default()
            };

            self.swapchain = self
                .swapchain_fn
                .create_swapchain(&swapchain_info, None)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            self.swapchain_images = self
                .swapchain_fn
                .get_swapchain_images(self.swapchain)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            self.swapchain_format = format.format;
            self.swapchain_extent = extent;

            self.swapchain_image_views = self
                .swapchain_images
                .iter()
                .map(|&image| {
                    let view_info = vk::ImageViewCreateInfo {
                        image,
                        view_type: vk::ImageViewType::TYPE_2D,
                        format: format.format,
                        components: vk::ComponentMapping::default(),
                        subresource_range: vk::ImageSubresourceRange {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            base_mip_level: 0,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        ..Default::default()
                    };
                    self.device.create_image_view(&view_info, None)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            // Register the views so the graph can reference them by handle
            self.swapchain_view_handles = self
                .swapchain_image_views
                .iter()
                .map(|&view| {
                    let id = self.next_view_id;
                    self.next_view_id += 1;
                    self.texture_views.insert(id, view);
                    TextureViewHandle(id)
                })
                .collect();

            Ok(())
        }
    }

    fn convert_format(format: TextureFormat) -> vk::Format {
        match format {
            TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
            TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
            TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
            TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
            TextureFormat::R32Float => vk::Format::R32_SFLOAT,
            TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
            TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
        }
    }

    fn convert_format_back(format: vk::Format) -> TextureFormat {
        match format {
            vk::Format::R8G8B8A8_UNORM => TextureFormat::Rgba8Unorm,
            vk::Format::R8G8B8A8_SRGB => TextureFormat::Rgba8UnormSrgb,
            vk::Format::B8G8R8A8_UNORM => TextureFormat::Bgra8Unorm,
            vk::Format::B8G8R8A8_SRGB => TextureFormat::Bgra8UnormSrgb,
            vk::Format::R16G16B16A16_SFLOAT => TextureFormat::Rgba16Float,
            vk::Format::R32G32B32A32_SFLOAT => TextureFormat::Rgba32Float,
            vk::Format::R32_SFLOAT => TextureFormat::R32Float,
            vk::Format::D32_SFLOAT => TextureFormat::Depth32Float,
            vk::Format::D24_UNORM_S8_UINT => TextureFormat::Depth24PlusStencil8,
            _ => TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
        match mode {
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        }
    }

    fn convert_border_color(color: BorderColor) -> vk::BorderColor {
        match color {
            BorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
            BorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
            BorderColor::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
        }
    }

    fn create_attachment(
        &mut self,
        desc: &AttachmentDescriptor,
        is_depth: bool,
    ) -> BackendResult<AttachmentImage> {
        unsafe {
            let format = Self::convert_format(desc.format);

            let usage = if is_depth {
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
            } else {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
            };

            let image_info = vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                extent: vk::Extent3D {
                    width: desc.width,
                    height: desc.height,
                    depth: 1,
                },
                mip_levels: 1,
                array_layers: 1,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                initial_layout: vk::ImageLayout::UNDEFINED,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                samples: vk::SampleCountFlags::TYPE_1,
                ..Default::default()
            };

            let image = self
                .device
                .create_image(&image_info, None)
                .map_err(|e| BackendError::TextureCreationFailed(e.to_string()))?;

            let requirements = self.device.get_image_memory_requirements(image);

            let allocation = self
                .allocator
                .as_ref()
                .ok_or_else(|| {
                    BackendError::TextureCreationFailed("Allocator not available".into())
                })?
                .lock()
                .allocate(&AllocationCreateDesc {
                    name: desc.label.as_deref().unwrap_or("attachment"),
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| BackendError::TextureCreationFailed(e.to_string()))?;

            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| BackendError::TextureCreationFailed(e.to_string()))?;

            let aspect_mask = if is_depth {
                vk::ImageAspectFlags::DEPTH
            } else {
                vk::ImageAspectFlags::COLOR
            };

            let view_info = vk::ImageViewCreateInfo {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };

            let view = self
                .device
                .create_image_view(&view_info, None)
                .map_err(|e| BackendError::TextureCreationFailed(e.to_string()))?;

            let sampler_info = vk::SamplerCreateInfo {
                mag_filter: vk::Filter::LINEAR,
                min_filter: vk::Filter::LINEAR,
                mipmap_mode: vk::SamplerMipmapMode::LINEAR,
                address_mode_u: Self::convert_address_mode(desc.address_modes[0]),
                address_mode_v: Self::convert_address_mode(desc.address_modes[1]),
                address_mode_w: Self::convert_address_mode(desc.address_modes[2]),
                border_color: Self::convert_border_color(desc.border_color),
                min_lod: 0.0,
                max_lod: vk::LOD_CLAMP_NONE,
                ..Default::default()
            };

            let sampler = self
                .device
                .create_sampler(&sampler_info, None)
                .map_err(|e| BackendError::TextureCreationFailed(e.to_string()))?;

            let texture_id = self.next_texture_id;
            self.next_texture_id += 1;
            self.textures.insert(
                texture_id,
                VkAttachmentTexture {
                    image,
                    allocation: Some(allocation),
                },
            );

            let view_id = self.next_view_id;
            self.next_view_id += 1;
            self.texture_views.insert(view_id, view);

            let sampler_id = self.next_sampler_id;
            self.next_sampler_id += 1;
            self.samplers.insert(sampler_id, sampler);

            Ok(AttachmentImage {
                texture: TextureHandle(texture_id),
                view: TextureViewHandle(view_id),
                sampler: SamplerHandle(sampler_id),
            })
        }
    }
}

impl RenderBackend for VulkanBackend {
    fn swapchain_extent(&self) -> Extent2d {
        Extent2d::new(self.swapchain_extent.width, self.swapchain_extent.height)
    }

    fn swapchain_format(&self) -> TextureFormat {
        Self::convert_format_back(self.swapchain_format)
    }

    fn swapchain_image_views(&self) -> Vec<TextureViewHandle> {
        self.swapchain_view_handles.clone()
    }

    fn create_color_attachment(
        &mut self,
        desc: &AttachmentDescriptor,
    ) -> BackendResult<AttachmentImage> {
        self.create_attachment(desc, false)
    }

    fn create_depth_attachment(
        &mut self,
        desc: &AttachmentDescriptor,
    ) -> BackendResult<AttachmentImage> {
        self.create_attachment(desc, true)
    }

    fn destroy_attachment(&mut self, attachment: AttachmentImage) {
        unsafe {
            if let Some(sampler) = self.samplers.remove(&attachment.sampler.0) {
                self.device.destroy_sampler(sampler, None);
            }
            if let Some(view) = self.texture_views.remove(&attachment.view.0) {
                self.device.destroy_image_view(view, None);
            }
            if let Some(mut texture) = self.textures.remove(&attachment.texture.0) {
                self.device.destroy_image(texture.image, None);
                if let (Some(allocator), Some(allocation)) =
                    (self.allocator.as_ref(), texture.allocation.take())
                {
                    if let Err(e) = allocator.lock().free(allocation) {
                        log::warn!("failed to free attachment memory: {}", e);
                    }
                }
            }
        }
    }

    fn create_render_pass(
        &mut self,
        desc: &RenderPassDescriptor,
    ) -> BackendResult<RenderPassHandle> {
        if desc.color_format.is_none() && desc.depth_format.is_none() {
            return Err(BackendError::RenderPassCreationFailed(
                "render pass needs at least one attachment".into(),
            ));
        }

        let mut attachments = Vec::with_capacity(2);
        let mut dependencies = Vec::with_capacity(2);

        // attachment index 0 is color when present, depth otherwise
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: if desc.color_format.is_some() { 1 } else { 0 },
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            ..Default::default()
        };

        if let Some(color_format) = desc.color_format {
            let final_layout = if desc.swapchain_output {
                vk::ImageLayout::PRESENT_SRC_KHR
            } else {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            };

            attachments.push(vk::AttachmentDescription {
                format: Self::convert_format(color_format),
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::DONT_CARE,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout,
                ..Default::default()
            });

            dependencies.push(vk::SubpassDependency {
                src_subpass: vk::SUBPASS_EXTERNAL,
                dst_subpass: 0,
                src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                src_access_mask: vk::AccessFlags::empty(),
                dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                ..Default::default()
            });

            subpass.color_attachment_count = 1;
            subpass.p_color_attachments = &color_ref;
        }

        if let Some(depth_format) = desc.depth_format {
            attachments.push(vk::AttachmentDescription {
                format: Self::convert_format(depth_format),
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::DONT_CARE,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            });

            let fragment_tests = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
            dependencies.push(vk::SubpassDependency {
                src_subpass: vk::SUBPASS_EXTERNAL,
                dst_subpass: 0,
                src_stage_mask: fragment_tests,
                dst_stage_mask: fragment_tests,
                src_access_mask: vk::AccessFlags::empty(),
                dst_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ..Default::default()
            });

            subpass.p_depth_stencil_attachment = &depth_ref;
        }

        let render_pass_info = vk::RenderPassCreateInfo {
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: dependencies.len() as u32,
            p_dependencies: dependencies.as_ptr(),
            ..Default::default()
        };

        let render_pass = unsafe {
            self.device
                .create_render_pass(&render_pass_info, None)
                .map_err(|e| BackendError::RenderPassCreationFailed(e.to_string()))?
        };

        let id = self.next_render_pass_id;
        self.next_render_pass_id += 1;
        self.render_passes.insert(id, render_pass);

        Ok(RenderPassHandle(id))
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) {
        if let Some(rp) = self.render_passes.remove(&render_pass.0) {
            unsafe { self.device.destroy_render_pass(rp, None) };
        }
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle> {
        let render_pass = self
            .render_passes
            .get(&desc.render_pass.0)
            .copied()
            .ok_or_else(|| {
                BackendError::FramebufferCreationFailed("render pass not found".into())
            })?;

        let views: Vec<vk::ImageView> = desc
            .attachments
            .iter()
            .map(|handle| {
                self.texture_views.get(&handle.0).copied().ok_or_else(|| {
                    BackendError::FramebufferCreationFailed("image view not found".into())
                })
            })
            .collect::<Result<_, _>>()?;

        let fb_info = vk::FramebufferCreateInfo {
            render_pass,
            attachment_count: views.len() as u32,
            p_attachments: views.as_ptr(),
            width: desc.extent.width,
            height: desc.extent.height,
            layers: 1,
            ..Default::default()
        };

        let framebuffer = unsafe {
            self.device
                .create_framebuffer(&fb_info, None)
                .map_err(|e| BackendError::FramebufferCreationFailed(e.to_string()))?
        };

        let id = self.next_framebuffer_id;
        self.next_framebuffer_id += 1;
        self.framebuffers.insert(id, framebuffer);

        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if let Some(fb) = self.framebuffers.remove(&framebuffer.0) {
            unsafe { self.device.destroy_framebuffer(fb, None) };
        }
    }

    fn create_command_pool(&mut self) -> BackendResult<CommandPoolHandle> {
        let pool_info = vk::CommandPoolCreateInfo {
            queue_family_index: self.graphics_queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };

        let pool = unsafe {
            self.device
                .create_command_pool(&pool_info, None)
                .map_err(|e| BackendError::CommandRecordingFailed(e.to_string()))?
        };

        let id = self.next_pool_id;
        self.next_pool_id += 1;
        self.command_pools.insert(id, pool);

        Ok(CommandPoolHandle(id))
    }

    fn destroy_command_pool(&mut self, pool: CommandPoolHandle) {
        if let Some(vk_pool) = self.command_pools.remove(&pool.0) {
            self.command_buffers.retain(|_, cb| cb.pool != pool.0);
            unsafe { self.device.destroy_command_pool(vk_pool, None) };
        }
    }

    fn allocate_command_buffers(
        &mut self,
        pool: CommandPoolHandle,
        count: u32,
    ) -> BackendResult<Vec<CommandBufferHandle>> {
        let vk_pool = self
            .command_pools
            .get(&pool.0)
            .copied()
            .ok_or_else(|| BackendError::CommandRecordingFailed("command pool not found".into()))?;

        let alloc_info = vk::CommandBufferAllocateInfo {
            command_pool: vk_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };

        let buffers = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| BackendError::CommandRecordingFailed(e.to_string()))?
        };

        Ok(buffers
            .into_iter()
            .map(|buffer| {
                let id = self.next_buffer_id;
                self.next_buffer_id += 1;
                self.command_buffers
                    .insert(id, VkCommandBuffer { buffer, pool: pool.0 });
                CommandBufferHandle(id)
            })
            .collect())
    }

    fn free_command_buffers(&mut self, pool: CommandPoolHandle, buffers: &[CommandBufferHandle]) {
        let Some(&vk_pool) = self.command_pools.get(&pool.0) else {
            return;
        };

        let vk_buffers: Vec<vk::CommandBuffer> = buffers
            .iter()
            .filter_map(|handle| self.command_buffers.remove(&handle.0))
            .map(|cb| cb.buffer)
            .collect();

        if !vk_buffers.is_empty() {
            unsafe { self.device.free_command_buffers(vk_pool, &vk_buffers) };
        }
    }

    fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> BackendResult<()> {
        let vk_pool = self
            .command_pools
            .get(&pool.0)
            .copied()
            .ok_or_else(|| BackendError::CommandRecordingFailed("command pool not found".into()))?;

        unsafe {
            self.device
                .reset_command_pool(vk_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| BackendError::CommandRecordingFailed(e.to_string()))
        }
    }

    fn begin_command_buffer(&mut self, buffer: CommandBufferHandle) -> BackendResult<()> {
        let cb = self
            .command_buffers
            .get(&buffer.0)
            .ok_or_else(|| BackendError::CommandRecordingFailed("command buffer not found".into()))?
            .buffer;

        let begin_info = vk::CommandBufferBeginInfo {
            flags: vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
            ..Default::default()
        };

        unsafe {
            self.device
                .begin_command_buffer(cb, &begin_info)
                .map_err(|e| BackendError::CommandRecordingFailed(e.to_string()))
        }
    }

    fn end_command_buffer(&mut self, buffer: CommandBufferHandle) -> BackendResult<()> {
        let cb = self
            .command_buffers
            .get(&buffer.0)
            .ok_or_else(|| BackendError::CommandRecordingFailed("command buffer not found".into()))?
            .buffer;

        unsafe {
            self.device
                .end_command_buffer(cb)
                .map_err(|e| BackendError::CommandRecordingFailed(e.to_string()))
        }
    }

    fn cmd_attachment_barrier(
        &mut self,
        buffer: CommandBufferHandle,
        texture: TextureHandle,
        barrier: BarrierKind,
    ) {
        let Some(cb) = self.command_buffers.get(&buffer.0).map(|cb| cb.buffer) else {
            log::error!("cmd_attachment_barrier: unknown command buffer");
            return;
        };
        let Some(tex) = self.textures.get(&texture.0) else {
            log::error!("cmd_attachment_barrier: unknown texture");
            return;
        };

        let fragment_tests = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;

        let (old_layout, src_access, src_stage, aspect_mask) = match barrier {
            BarrierKind::ColorToShaderRead => (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::ImageAspectFlags::COLOR,
            ),
            BarrierKind::DepthToShaderRead => (
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                fragment_tests,
                vk::ImageAspectFlags::DEPTH,
            ),
        };

        let image_barrier = vk::ImageMemoryBarrier {
            old_layout,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            src_access_mask: src_access,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: tex.image,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };

        unsafe {
            self.device.cmd_pipeline_barrier(
                cb,
                src_stage,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            );
        }
    }

    fn cmd_begin_render_pass(
        &mut self,
        buffer: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        render_area: Extent2d,
        clear_values: &[ClearValue],
    ) {
        let Some(cb) = self.command_buffers.get(&buffer.0).map(|cb| cb.buffer) else {
            log::error!("cmd_begin_render_pass: unknown command buffer");
            return;
        };
        let Some(&rp) = self.render_passes.get(&render_pass.0) else {
            log::error!("cmd_begin_render_pass: unknown render pass");
            return;
        };
        let Some(&fb) = self.framebuffers.get(&framebuffer.0) else {
            log::error!("cmd_begin_render_pass: unknown framebuffer");
            return;
        };

        let vk_clear_values: Vec<vk::ClearValue> = clear_values
            .iter()
            .map(|value| match *value {
                ClearValue::Color(float32) => vk::ClearValue {
                    color: vk::ClearColorValue { float32 },
                },
                ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
                },
            })
            .collect();

        let begin_info = vk::RenderPassBeginInfo {
            render_pass: rp,
            framebuffer: fb,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: render_area.width,
                    height: render_area.height,
                },
            },
            clear_value_count: vk_clear_values.len() as u32,
            p_clear_values: vk_clear_values.as_ptr(),
            ..Default::default()
        };

        unsafe {
            self.device
                .cmd_begin_render_pass(cb, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn cmd_end_render_pass(&mut self, buffer: CommandBufferHandle) {
        let Some(cb) = self.command_buffers.get(&buffer.0).map(|cb| cb.buffer) else {
            log::error!("cmd_end_render_pass: unknown command buffer");
            return;
        };
        unsafe { self.device.cmd_end_render_pass(cb) };
    }

    fn submit(&mut self, buffers: &[CommandBufferHandle]) -> BackendResult<()> {
        let vk_buffers: Vec<vk::CommandBuffer> = buffers
            .iter()
            .map(|handle| {
                self.command_buffers
                    .get(&handle.0)
                    .map(|cb| cb.buffer)
                    .ok_or_else(|| BackendError::SubmitFailed("command buffer not found".into()))
            })
            .collect::<Result<_, _>>()?;

        let submit_info = vk::SubmitInfo {
            command_buffer_count: vk_buffers.len() as u32,
            p_command_buffers: vk_buffers.as_ptr(),
            ..Default::default()
        };

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())
                .map_err(|e| BackendError::SubmitFailed(e.to_string()))
        }
    }

    fn wait_idle(&mut self) {
        unsafe { self.device.device_wait_idle().ok() };
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            for (_, fb) in self.framebuffers.drain() {
                self.device.destroy_framebuffer(fb, None);
            }
            for (_, rp) in self.render_passes.drain() {
                self.device.destroy_render_pass(rp, None);
            }
            for (_, pool) in self.command_pools.drain() {
                self.device.destroy_command_pool(pool, None);
            }
            for (_, sampler) in self.samplers.drain() {
                self.device.destroy_sampler(sampler, None);
            }

            // Swapchain views are tracked in texture_views as well; destroy
            // each vk::ImageView exactly once.
            for &view in &self.swapchain_image_views {
                self.device.destroy_image_view(view, None);
            }
            for handle in self.swapchain_view_handles.drain(..) {
                self.texture_views.remove(&handle.0);
            }
            for (_, view) in self.texture_views.drain() {
                self.device.destroy_image_view(view, None);
            }

            let allocator = self.allocator.take();
            for (_, mut texture) in self.textures.drain() {
                self.device.destroy_image(texture.image, None);
                if let (Some(allocator), Some(allocation)) =
                    (allocator.as_ref(), texture.allocation.take())
                {
                    allocator.lock().free(allocation).ok();
                }
            }
            drop(allocator);

            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_fn.destroy_swapchain(self.swapchain, None);
            }
            self.device.destroy_device(None);
            self.surface_fn.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}
