// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen,
// plus everything sized or formatted after them: depth buffers, the render
// pass, framebuffers and the per-frame sync objects.
//
// A chain goes stale when the surface changes (resize, display mode).
// The Renderer then builds a replacement from the old one; image and
// depth formats must not change across that boundary.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;

use super::sync::{self, DeviceFences, FrameSync, ImageOwnership, MAX_FRAMES_IN_FLIGHT};
use super::VulkanDevice;
use crate::error::FatalError;

/// Color and depth formats a chain renders with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

impl SwapChainFormats {
    /// Fails when a recreated chain (`current`) changed format
    pub fn ensure_compatible(&self, current: &SwapChainFormats) -> Result<(), FatalError> {
        if self == current {
            Ok(())
        } else {
            Err(FatalError::FormatMismatch {
                previous: *self,
                current: *current,
            })
        }
    }
}

/// Outcome of asking the presentation engine for an image
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// Image acquired. A suboptimal chain still renders; recreate after
    /// presenting.
    Ready { image_index: u32, suboptimal: bool },
    /// Chain no longer matches the surface; nothing was acquired
    OutOfDate,
}

/// Outcome of presenting a frame
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    pub fn needs_recreation(self) -> bool {
        !matches!(self, PresentStatus::Presented)
    }
}

pub fn acquire_status(result: VkResult<(u32, bool)>) -> Result<AcquireStatus> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireStatus::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
        Err(e) => Err(e).context("Failed to acquire swap chain image"),
    }
}

pub fn present_status(result: VkResult<bool>) -> Result<PresentStatus> {
    match result {
        Ok(false) => Ok(PresentStatus::Presented),
        Ok(true) => Ok(PresentStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
        Err(e) => Err(e).context("Failed to present swap chain image"),
    }
}

/// Prefer B8G8R8A8_SRGB in the sRGB color space, else the first format
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Use `preferred` when offered. FIFO is always supported.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's own extent when it dictates one, else the window extent
/// clamped to the supported range
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: window_extent.width.max(min.width).min(max.width),
        height: window_extent.height.max(min.height).min(max.height),
    }
}

/// One more than the minimum, capped by the maximum (0 = no maximum)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

struct DepthImage {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

pub struct SwapChain<'d> {
    device: &'d VulkanDevice,
    loader: khr::Swapchain,
    swap_chain: vk::SwapchainKHR,
    formats: SwapChainFormats,
    extent: vk::Extent2D,

    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_images: Vec<DepthImage>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,

    frames: Vec<FrameSync>,
    image_ownership: ImageOwnership,
}

impl<'d> SwapChain<'d> {
    pub fn new(
        device: &'d VulkanDevice,
        window_extent: vk::Extent2D,
        present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        Self::with_previous(device, window_extent, present_mode, None)
    }

    /// Build a chain, handing `previous` to the driver for resource reuse.
    /// Fails if the new chain's formats differ from the previous ones.
    pub fn with_previous(
        device: &'d VulkanDevice,
        window_extent: vk::Extent2D,
        present_mode: vk::PresentModeKHR,
        previous: Option<&SwapChain<'_>>,
    ) -> Result<Self> {
        // Handles start null so Drop can clean up a partially built chain
        let mut chain = Self {
            device,
            loader: khr::Swapchain::new(&device.instance, &device.device),
            swap_chain: vk::SwapchainKHR::null(),
            formats: SwapChainFormats {
                color: vk::Format::UNDEFINED,
                depth: vk::Format::UNDEFINED,
            },
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            image_views: Vec::new(),
            depth_images: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            frames: Vec::new(),
            image_ownership: ImageOwnership::new(0),
        };

        let old_swap_chain = previous.map_or(vk::SwapchainKHR::null(), |p| p.swap_chain);
        chain.create_swap_chain(window_extent, present_mode, old_swap_chain)?;
        chain.create_image_views()?;
        chain.create_depth_resources()?;
        chain.create_render_pass()?;
        chain.create_framebuffers()?;
        chain.create_sync_objects()?;

        if let Some(previous) = previous {
            previous.formats.ensure_compatible(&chain.formats)?;
        }

        Ok(chain)
    }

    fn create_swap_chain(
        &mut self,
        window_extent: vk::Extent2D,
        preferred_mode: vk::PresentModeKHR,
        old_swap_chain: vk::SwapchainKHR,
    ) -> Result<()> {
        let support = self.device.swap_chain_support()?;

        let surface_format =
            choose_surface_format(&support.formats).context("Surface reports no formats")?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_mode);
        if present_mode != preferred_mode {
            log::warn!(
                "Present mode {:?} unavailable, falling back to {:?}",
                preferred_mode,
                present_mode
            );
        }
        let extent = choose_extent(&support.capabilities, window_extent);
        let image_count = choose_image_count(&support.capabilities);

        log::info!(
            "Creating swap chain: {}x{}, {:?}, {:?}",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        let queue_family_indices = [
            self.device.graphics_queue_family,
            self.device.present_queue_family,
        ];

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.device.surface())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swap_chain);

        // Separate graphics and present families share the images
        let create_info = if queue_family_indices[0] != queue_family_indices[1] {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        self.swap_chain = unsafe { self.loader.create_swapchain(&create_info, None) }
            .context("Failed to create swap chain")?;

        self.images = unsafe { self.loader.get_swapchain_images(self.swap_chain) }
            .context("Failed to get swap chain images")?;
        self.formats.color = surface_format.format;
        self.extent = extent;

        log::info!("Created swap chain with {} images", self.images.len());
        Ok(())
    }

    fn create_image_views(&mut self) -> Result<()> {
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.formats.color)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { self.device.device.create_image_view(&create_info, None) }
                .context("Failed to create image view")?;
            self.image_views.push(view);
        }
        Ok(())
    }

    /// One depth image per swap chain image
    fn create_depth_resources(&mut self) -> Result<()> {
        let format = self.device.find_depth_format()?;
        self.formats.depth = format;

        let aspect_mask = if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };

        for _ in 0..self.images.len() {
            let image_info = vk::ImageCreateInfo::builder()
                .image_type(vk::ImageType::TYPE_2D)
                .extent(vk::Extent3D {
                    width: self.extent.width,
                    height: self.extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .format(format)
                .tiling(vk::ImageTiling::OPTIMAL)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
                .samples(vk::SampleCountFlags::TYPE_1)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let (image, memory) = self
                .device
                .create_image_with_info(&image_info, vk::MemoryPropertyFlags::DEVICE_LOCAL)
                .context("Failed to create depth image")?;
            self.depth_images.push(DepthImage {
                image,
                memory,
                view: vk::ImageView::null(),
            });

            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { self.device.device.create_image_view(&view_info, None) }
                .context("Failed to create depth image view")?;
            if let Some(depth) = self.depth_images.last_mut() {
                depth.view = view;
            }
        }
        Ok(())
    }

    fn create_render_pass(&mut self) -> Result<()> {
        // Color attachment (the swapchain image)
        let color_attachment = vk::AttachmentDescription::builder()
            .format(self.formats.color)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        // Depth attachment
        let depth_attachment = vk::AttachmentDescription::builder()
            .format(self.formats.depth)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE) // Don't need to store depth
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachment_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_attachment_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        // Single subpass with color and depth
        let color_attachments = [color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachments)
            .depth_stencil_attachment(&depth_attachment_ref)
            .build();

        // Wait for the previous use of both attachments before writing
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build();

        let attachments = [color_attachment, depth_attachment];
        let subpasses = [subpass];
        let dependencies = [dependency];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        self.render_pass = unsafe { self.device.device.create_render_pass(&render_pass_info, None) }
            .context("Failed to create render pass")?;
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        for (&image_view, depth) in self.image_views.iter().zip(&self.depth_images) {
            let attachments = [image_view, depth.view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe { self.device.device.create_framebuffer(&framebuffer_info, None) }
                .context("Failed to create framebuffer")?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    fn create_sync_objects(&mut self) -> Result<()> {
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            self.frames.push(FrameSync::new(&self.device.device)?);
        }
        self.image_ownership = ImageOwnership::new(self.images.len());
        Ok(())
    }

    /// Wait until `frame`'s previous submission has finished, then ask the
    /// presentation engine for an image. Blocks without timeout.
    pub fn acquire_next_image(&mut self, frame: usize) -> Result<AcquireStatus> {
        let mut fences = DeviceFences {
            device: &self.device.device,
            frames: &self.frames,
        };
        sync::before_record(&mut fences, frame)?;

        let result = unsafe {
            self.loader.acquire_next_image(
                self.swap_chain,
                u64::MAX,
                self.frames[frame].image_available,
                vk::Fence::null(),
            )
        };
        acquire_status(result)
    }

    /// Submit `command_buffer` for `image_index` and queue it for
    /// presentation. Submission failures are fatal; a stale chain is
    /// reported in the status.
    pub fn submit_command_buffers(
        &mut self,
        frame: usize,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<PresentStatus> {
        let mut fences = DeviceFences {
            device: &self.device.device,
            frames: &self.frames,
        };
        sync::before_submit(&mut fences, &mut self.image_ownership, frame, image_index)?;

        let sync = &self.frames[frame];
        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                sync.in_flight_fence,
            )
        }
        .context("Failed to submit draw command buffer")?;

        let swap_chains = [self.swap_chain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swap_chains)
            .image_indices(&image_indices);

        present_status(unsafe {
            self.loader
                .queue_present(self.device.present_queue, &present_info)
        })
    }

    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn formats(&self) -> SwapChainFormats {
        self.formats
    }

    pub fn image_format(&self) -> vk::Format {
        self.formats.color
    }

    pub fn depth_format(&self) -> vk::Format {
        self.formats.depth
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    pub fn extent_aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    pub fn compare_swap_formats(&self, other: &SwapChain<'_>) -> bool {
        self.formats == other.formats
    }
}

impl Drop for SwapChain<'_> {
    fn drop(&mut self) {
        let device = &self.device.device;
        unsafe {
            for &view in &self.image_views {
                device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swap_chain, None);

            for depth in &self.depth_images {
                device.destroy_image_view(depth.view, None);
                device.destroy_image(depth.image, None);
                device.free_memory(depth.memory, None);
            }

            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_render_pass(self.render_pass, None);

            for frame in &self.frames {
                frame.destroy(device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        }
    }

    fn formats(color: vk::Format, depth: vk::Format) -> SwapChainFormats {
        SwapChainFormats { color, depth }
    }

    #[test]
    fn prefers_srgb_surface_format() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        let chosen = |available: &[vk::SurfaceFormatKHR]| {
            choose_surface_format(available).map(|f| f.format)
        };

        assert_eq!(chosen(&[unorm, srgb]), Some(vk::Format::B8G8R8A8_SRGB));
        assert_eq!(chosen(&[unorm]), Some(vk::Format::B8G8R8A8_UNORM));
        assert_eq!(chosen(&[]), None);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];

        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_follows_surface_when_fixed() {
        let mut caps = capabilities(2, 3);
        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        let extent = choose_extent(&caps, vk::Extent2D { width: 1, height: 1 });
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_is_clamped_to_surface_limits() {
        let caps = capabilities(2, 3);

        let large = choose_extent(&caps, vk::Extent2D { width: 4000, height: 500 });
        assert_eq!((large.width, large.height), (1920, 500));

        let small = choose_extent(&caps, vk::Extent2D { width: 10, height: 10 });
        assert_eq!((small.width, small.height), (64, 64));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities(3, 3)), 3);
    }

    #[test]
    fn matching_formats_are_compatible() {
        let previous = formats(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);

        assert!(previous.ensure_compatible(&previous).is_ok());
    }

    #[test]
    fn changed_depth_format_is_fatal() {
        let previous = formats(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        let current = formats(vk::Format::B8G8R8A8_SRGB, vk::Format::D24_UNORM_S8_UINT);

        let err = previous.ensure_compatible(&current).unwrap_err();
        assert!(matches!(err, FatalError::FormatMismatch { .. }));
    }

    #[test]
    fn changed_color_format_is_fatal() {
        let previous = formats(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        let current = formats(vk::Format::R8G8B8A8_UNORM, vk::Format::D32_SFLOAT);

        assert!(previous.ensure_compatible(&current).is_err());
    }

    #[test]
    fn stencil_formats_are_detected() {
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn acquire_results_map_to_status() {
        assert_eq!(
            acquire_status(Ok((2, false))).unwrap(),
            AcquireStatus::Ready {
                image_index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            acquire_status(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireStatus::OutOfDate
        );
        assert!(acquire_status(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn present_results_map_to_status() {
        assert_eq!(present_status(Ok(false)).unwrap(), PresentStatus::Presented);
        assert_eq!(present_status(Ok(true)).unwrap(), PresentStatus::Suboptimal);
        assert_eq!(
            present_status(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentStatus::OutOfDate
        );
        assert!(present_status(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());

        assert!(!PresentStatus::Presented.needs_recreation());
        assert!(PresentStatus::Suboptimal.needs_recreation());
        assert!(PresentStatus::OutOfDate.needs_recreation());
    }
}
