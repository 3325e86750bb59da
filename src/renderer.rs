// Frame bracketing on top of the swap chain
//
// begin_frame -> begin_swap_chain_render_pass -> (draw) ->
// end_swap_chain_render_pass -> end_frame
//
// A stale swap chain is rebuilt here, so callers only ever see "no frame
// this iteration" and never a presentation error.

use anyhow::{Context, Result};
use ash::vk;

use crate::backend::sync::FrameTracker;
use crate::backend::{AcquireStatus, SwapChain, VulkanDevice, MAX_FRAMES_IN_FLIGHT};

/// What the renderer needs from the platform window
pub trait RenderWindow {
    /// Current drawable size in pixels. Zero while minimized.
    fn extent(&self) -> vk::Extent2D;
    fn was_resized(&self) -> bool;
    fn reset_resized_flag(&mut self);
    /// Block until the platform delivers at least one event. Returns false
    /// once the window is closed and no more events will arrive.
    fn wait_events(&mut self) -> bool;
}

/// Block until the window has a drawable area again. `None` if the window
/// closed while minimized.
pub fn wait_for_extent(window: &mut impl RenderWindow) -> Option<vk::Extent2D> {
    let mut extent = window.extent();
    while extent.width == 0 || extent.height == 0 {
        if !window.wait_events() {
            return None;
        }
        extent = window.extent();
    }
    Some(extent)
}

/// Viewport and scissor covering the whole extent
pub fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

pub struct Renderer<'d> {
    device: &'d VulkanDevice,
    swap_chain: SwapChain<'d>,
    command_buffers: Vec<vk::CommandBuffer>,
    frames: FrameTracker,
    present_mode: vk::PresentModeKHR,
    clear_color: [f32; 4],
}

impl<'d> Renderer<'d> {
    pub fn new(
        device: &'d VulkanDevice,
        window: &mut impl RenderWindow,
        present_mode: vk::PresentModeKHR,
        clear_color: [f32; 4],
    ) -> Result<Self> {
        let extent = wait_for_extent(window).context("Window closed before it was shown")?;
        let swap_chain = SwapChain::new(device, extent, present_mode)?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(device.command_pool())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(MAX_FRAMES_IN_FLIGHT as u32);

        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        log::info!(
            "Renderer ready: {}x{}, {} images, {} frames in flight",
            swap_chain.width(),
            swap_chain.height(),
            swap_chain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            device,
            swap_chain,
            command_buffers,
            frames: FrameTracker::new(MAX_FRAMES_IN_FLIGHT),
            present_mode,
            clear_color,
        })
    }

    // =========================================================================
    // SWAP CHAIN RECREATION
    // =========================================================================

    fn recreate_swap_chain(&mut self, window: &mut impl RenderWindow) -> Result<()> {
        let Some(extent) = wait_for_extent(window) else {
            log::debug!("Window closed while minimized, keeping the old swap chain");
            return Ok(());
        };
        self.device.wait_idle()?;

        // The old chain stays alive until its successor exists
        let swap_chain = SwapChain::with_previous(
            self.device,
            extent,
            self.present_mode,
            Some(&self.swap_chain),
        )
        .context("Failed to recreate swap chain")?;
        self.swap_chain = swap_chain;

        log::debug!(
            "Swap chain recreated at {}x{}",
            self.swap_chain.width(),
            self.swap_chain.height()
        );
        Ok(())
    }

    // =========================================================================
    // FRAME BRACKETING
    // =========================================================================

    /// Start recording the next frame. `None` means the swap chain was
    /// stale and has been rebuilt: skip this iteration.
    pub fn begin_frame(
        &mut self,
        window: &mut impl RenderWindow,
    ) -> Result<Option<vk::CommandBuffer>> {
        debug_assert!(
            !self.frames.is_frame_started(),
            "Can't call begin_frame while already in progress"
        );

        let image_index = match self.swap_chain.acquire_next_image(self.frames.frame_index())? {
            AcquireStatus::OutOfDate => {
                self.recreate_swap_chain(window)?;
                return Ok(None);
            }
            AcquireStatus::Ready {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    log::debug!("Acquired image {} from a suboptimal swap chain", image_index);
                }
                image_index
            }
        };

        self.frames.start(image_index);
        let command_buffer = self.current_command_buffer();

        let begin_info = vk::CommandBufferBeginInfo::builder();
        if let Err(e) = unsafe {
            self.device
                .device
                .begin_command_buffer(command_buffer, &begin_info)
        } {
            self.frames.abort();
            return Err(e).context("Failed to begin recording command buffer");
        }

        Ok(Some(command_buffer))
    }

    /// Submit and present the frame. The in-flight slot advances whatever
    /// the outcome.
    pub fn end_frame(&mut self, window: &mut impl RenderWindow) -> Result<()> {
        debug_assert!(
            self.frames.is_frame_started(),
            "Can't call end_frame while frame is not in progress"
        );

        let command_buffer = self.current_command_buffer();
        let frame = self.frames.frame_index();
        let image_index = self.frames.image_index();

        let submitted = unsafe { self.device.device.end_command_buffer(command_buffer) }
            .context("Failed to record command buffer")
            .and_then(|()| {
                self.swap_chain
                    .submit_command_buffers(frame, command_buffer, image_index)
            });
        self.frames.finish();

        let status = submitted?;
        if status.needs_recreation() || window.was_resized() {
            window.reset_resized_flag();
            self.recreate_swap_chain(window)?;
        }
        Ok(())
    }

    pub fn begin_swap_chain_render_pass(&self, command_buffer: vk::CommandBuffer) {
        debug_assert!(
            self.frames.is_frame_started(),
            "Can't call begin_swap_chain_render_pass if frame is not in progress"
        );
        debug_assert!(
            command_buffer == self.current_command_buffer(),
            "Can't begin render pass on command buffer from a different frame"
        );

        let extent = self.swap_chain.extent();
        let clear_values = clear_values(self.clear_color);
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.swap_chain.render_pass())
            .framebuffer(
                self.swap_chain
                    .framebuffer(self.frames.image_index() as usize),
            )
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let (viewport, scissor) = full_viewport(extent);

        let device = &self.device.device;
        unsafe {
            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    pub fn end_swap_chain_render_pass(&self, command_buffer: vk::CommandBuffer) {
        debug_assert!(
            self.frames.is_frame_started(),
            "Can't call end_swap_chain_render_pass if frame is not in progress"
        );
        debug_assert!(
            command_buffer == self.current_command_buffer(),
            "Can't end render pass on command buffer from a different frame"
        );

        unsafe { self.device.device.cmd_end_render_pass(command_buffer) };
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn swap_chain_render_pass(&self) -> vk::RenderPass {
        self.swap_chain.render_pass()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swap_chain.extent_aspect_ratio()
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.frames.is_frame_started()
    }

    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        debug_assert!(
            self.frames.is_frame_started(),
            "Cannot get command buffer when frame not in progress"
        );
        self.command_buffers[self.frames.frame_index()]
    }

    pub fn frame_index(&self) -> usize {
        debug_assert!(
            self.frames.is_frame_started(),
            "Cannot get frame index when frame not in progress"
        );
        self.frames.frame_index()
    }
}

impl Drop for Renderer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle failed during renderer teardown: {:#}", e);
        }
        unsafe {
            self.device
                .device
                .free_command_buffers(self.device.command_pool(), &self.command_buffers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Reports queued extents, one per wait_events call
    struct FakeWindow {
        extents: VecDeque<(u32, u32)>,
        waits: usize,
        resized: bool,
    }

    impl FakeWindow {
        fn new(extents: &[(u32, u32)]) -> Self {
            Self {
                extents: extents.iter().copied().collect(),
                waits: 0,
                resized: false,
            }
        }
    }

    impl RenderWindow for FakeWindow {
        fn extent(&self) -> vk::Extent2D {
            let (width, height) = self.extents.front().copied().unwrap_or((0, 0));
            vk::Extent2D { width, height }
        }

        fn was_resized(&self) -> bool {
            self.resized
        }

        fn reset_resized_flag(&mut self) {
            self.resized = false;
        }

        fn wait_events(&mut self) -> bool {
            self.waits += 1;
            self.extents.pop_front();
            !self.extents.is_empty()
        }
    }

    #[test]
    fn visible_window_does_not_wait() {
        let mut window = FakeWindow::new(&[(800, 600)]);

        let extent = wait_for_extent(&mut window).unwrap();

        assert_eq!((extent.width, extent.height), (800, 600));
        assert_eq!(window.waits, 0);
    }

    #[test]
    fn minimized_window_waits_for_non_zero_extent() {
        let mut window = FakeWindow::new(&[(0, 0), (1024, 0), (0, 768), (1024, 768)]);

        let extent = wait_for_extent(&mut window).unwrap();

        assert_eq!((extent.width, extent.height), (1024, 768));
        assert_eq!(window.waits, 3);
    }

    #[test]
    fn closing_while_minimized_stops_waiting() {
        let mut window = FakeWindow::new(&[(0, 0), (0, 0)]);

        assert!(wait_for_extent(&mut window).is_none());
        assert_eq!(window.waits, 2);
    }

    #[test]
    fn viewport_covers_extent() {
        let (viewport, scissor) = full_viewport(vk::Extent2D {
            width: 1280,
            height: 720,
        });

        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (1280.0, 720.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!((scissor.extent.width, scissor.extent.height), (1280, 720));
    }

    #[test]
    fn clears_color_and_far_depth() {
        let values = clear_values([0.1, 0.2, 0.3, 1.0]);

        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }
}
