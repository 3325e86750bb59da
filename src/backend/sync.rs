// Synchronization primitives and frame pacing
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync.
//
// Up to MAX_FRAMES_IN_FLIGHT frames may be queued on the GPU while the
// host records the next one. Two rules keep that safe:
// - a frame slot's command buffer is reused only after the slot's fence
//   has signaled (waited on in acquire)
// - a swap chain image is rendered to only after the last frame that used
//   it has finished (waited on in submit, via ImageOwnership)

use anyhow::{Context, Result};
use ash::vk;

/// Frames the host may run ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        unsafe {
            Ok(Self {
                image_available: device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create image-available semaphore")?,
                render_finished: device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create render-finished semaphore")?,
                in_flight_fence: device
                    .create_fence(&fence_info, None)
                    .context("Failed to create in-flight fence")?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Host-side view of per-frame fences
pub trait FenceSet {
    /// Block until every submission signaling `frame`'s fence has completed
    fn wait(&mut self, frame: usize) -> Result<()>;

    /// Return `frame`'s fence to unsignaled, right before a new submission
    fn reset(&mut self, frame: usize) -> Result<()>;
}

/// The in-flight fences of a swap chain
pub struct DeviceFences<'a> {
    pub device: &'a ash::Device,
    pub frames: &'a [FrameSync],
}

impl FenceSet for DeviceFences<'_> {
    fn wait(&mut self, frame: usize) -> Result<()> {
        let fences = [self.frames[frame].in_flight_fence];
        unsafe { self.device.wait_for_fences(&fences, true, u64::MAX) }
            .context("Failed waiting for in-flight fence")
    }

    fn reset(&mut self, frame: usize) -> Result<()> {
        let fences = [self.frames[frame].in_flight_fence];
        unsafe { self.device.reset_fences(&fences) }.context("Failed to reset in-flight fence")
    }
}

/// Which frame slot last submitted work for each swap chain image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOwnership {
    owners: Vec<Option<usize>>,
}

impl ImageOwnership {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Record `frame` as the new user of `image`, returning the previous one
    pub fn claim(&mut self, image: u32, frame: usize) -> Option<usize> {
        self.owners[image as usize].replace(frame)
    }

    pub fn owner(&self, image: u32) -> Option<usize> {
        self.owners[image as usize]
    }
}

/// Wait before recording into `frame`'s command buffer
pub fn before_record(fences: &mut impl FenceSet, frame: usize) -> Result<()> {
    fences.wait(frame)
}

/// Wait until `image` is free, then reset `frame`'s fence for submission.
/// The frame's own fence was already waited on in `before_record`.
pub fn before_submit(
    fences: &mut impl FenceSet,
    ownership: &mut ImageOwnership,
    frame: usize,
    image: u32,
) -> Result<()> {
    if let Some(previous) = ownership.claim(image, frame) {
        if previous != frame {
            fences.wait(previous)?;
        }
    }
    fences.reset(frame)
}

/// Wait for the device to go idle once `result` is known, whatever it is.
/// Resources referenced by in-flight frames may be destroyed afterwards.
/// An error in `result` takes precedence over a failed wait.
pub fn drain_after<T>(result: Result<T>, wait_idle: impl FnOnce() -> Result<()>) -> Result<T> {
    let idle = wait_idle();
    match (result, idle) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(idle_error)) => {
            log::error!("wait_idle failed after an error: {:#}", idle_error);
            Err(e)
        }
    }
}

/// Frame bracketing state: current in-flight slot and acquired image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTracker {
    frame_count: usize,
    frame_index: usize,
    image_index: u32,
    frame_started: bool,
}

impl FrameTracker {
    pub fn new(frame_count: usize) -> Self {
        debug_assert!(frame_count > 0, "at least one frame in flight");
        Self {
            frame_count,
            frame_index: 0,
            image_index: 0,
            frame_started: false,
        }
    }

    pub fn start(&mut self, image_index: u32) {
        debug_assert!(
            !self.frame_started,
            "Can't begin a frame while one is already in progress"
        );
        self.image_index = image_index;
        self.frame_started = true;
    }

    /// End the frame and move to the next slot, whatever the submission
    /// outcome was
    pub fn finish(&mut self) {
        debug_assert!(self.frame_started, "Can't end a frame that was not started");
        self.frame_started = false;
        self.frame_index = (self.frame_index + 1) % self.frame_count;
    }

    /// Drop a frame that never reached submission. The slot is reused.
    pub fn abort(&mut self) {
        debug_assert!(self.frame_started, "Can't abort a frame that was not started");
        self.frame_started = false;
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn image_index(&self) -> u32 {
        debug_assert!(self.frame_started, "No image acquired outside a frame");
        self.image_index
    }

    pub fn is_frame_started(&self) -> bool {
        self.frame_started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A GPU that finishes work only when the host waits for it, the
    /// slowest schedule a real device could pick
    struct SimulatedGpu {
        signaled: Vec<bool>,
        pending: Vec<Option<u32>>,
        image_busy: Vec<bool>,
    }

    impl SimulatedGpu {
        fn new(frames: usize, images: usize) -> Self {
            Self {
                signaled: vec![true; frames],
                pending: vec![None; frames],
                image_busy: vec![false; images],
            }
        }

        fn record(&self, frame: usize) {
            assert!(
                self.signaled[frame] && self.pending[frame].is_none(),
                "recording into command buffer {frame} while it is in flight"
            );
        }

        fn submit(&mut self, frame: usize, image: u32) {
            assert!(!self.signaled[frame], "submitting with a signaled fence");
            assert!(
                !self.image_busy[image as usize],
                "image {image} reused before its previous frame finished"
            );
            self.pending[frame] = Some(image);
            self.image_busy[image as usize] = true;
        }
    }

    impl FenceSet for SimulatedGpu {
        fn wait(&mut self, frame: usize) -> Result<()> {
            if let Some(image) = self.pending[frame].take() {
                self.image_busy[image as usize] = false;
            }
            self.signaled[frame] = true;
            Ok(())
        }

        fn reset(&mut self, frame: usize) -> Result<()> {
            assert!(self.pending[frame].is_none(), "reset of a pending fence");
            self.signaled[frame] = false;
            Ok(())
        }
    }

    #[test]
    fn frame_index_wraps() {
        let mut tracker = FrameTracker::new(MAX_FRAMES_IN_FLIGHT);
        let mut seen = Vec::new();

        for image in 0..5 {
            seen.push(tracker.frame_index());
            tracker.start(image % 3);
            tracker.finish();
        }

        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn aborted_frame_keeps_its_slot() {
        let mut tracker = FrameTracker::new(MAX_FRAMES_IN_FLIGHT);

        tracker.start(2);
        tracker.abort();
        assert!(!tracker.is_frame_started());
        assert_eq!(tracker.frame_index(), 0);

        tracker.start(0);
        tracker.finish();
        assert_eq!(tracker.frame_index(), 1);
    }

    #[test]
    fn drain_runs_after_success_and_failure() {
        let mut drained = 0;
        let ok: Result<u32> = drain_after(Ok(7), || {
            drained += 1;
            Ok(())
        });
        assert_eq!(ok.unwrap(), 7);

        let failed: Result<u32> = drain_after(Err(anyhow::anyhow!("surface lost")), || {
            drained += 1;
            Ok(())
        });
        assert_eq!(failed.unwrap_err().to_string(), "surface lost");
        assert_eq!(drained, 2);
    }

    #[test]
    fn first_error_wins_over_drain_error() {
        let both: Result<()> = drain_after(Err(anyhow::anyhow!("submit failed")), || {
            Err(anyhow::anyhow!("device lost"))
        });
        assert_eq!(both.unwrap_err().to_string(), "submit failed");

        let drain_only: Result<()> = drain_after(Ok(()), || Err(anyhow::anyhow!("device lost")));
        assert_eq!(drain_only.unwrap_err().to_string(), "device lost");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already in progress")]
    fn nested_begin_is_rejected() {
        let mut tracker = FrameTracker::new(2);
        tracker.start(0);
        tracker.start(1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not started")]
    fn end_without_begin_is_rejected() {
        let mut tracker = FrameTracker::new(2);
        tracker.finish();
    }

    #[test]
    fn ownership_reports_previous_frame() {
        let mut ownership = ImageOwnership::new(3);

        assert_eq!(ownership.claim(1, 0), None);
        assert_eq!(ownership.claim(1, 1), Some(0));
        assert_eq!(ownership.owner(1), Some(1));
        assert_eq!(ownership.owner(2), None);
    }

    #[test]
    fn two_frames_three_images_never_touch_busy_resources() {
        const IMAGES: usize = 3;

        let mut gpu = SimulatedGpu::new(MAX_FRAMES_IN_FLIGHT, IMAGES);
        let mut ownership = ImageOwnership::new(IMAGES);
        let mut tracker = FrameTracker::new(MAX_FRAMES_IN_FLIGHT);

        // `None` is a stale chain on acquire: the frame is skipped
        let acquires = [Some(0), Some(1), None, Some(1), Some(2), Some(0)];
        let mut completed = Vec::new();

        for acquired in acquires {
            let frame = tracker.frame_index();
            before_record(&mut gpu, frame).unwrap();

            let Some(image) = acquired else {
                assert!(!tracker.is_frame_started());
                continue;
            };
            tracker.start(image);
            gpu.record(frame);

            before_submit(&mut gpu, &mut ownership, frame, image).unwrap();
            gpu.submit(frame, image);

            completed.push((frame, image));
            tracker.finish();
        }

        assert_eq!(completed, vec![(0, 0), (1, 1), (0, 1), (1, 2), (0, 0)]);
    }

    #[test]
    fn image_reuse_waits_for_the_other_frame() {
        let mut gpu = SimulatedGpu::new(2, 3);
        let mut ownership = ImageOwnership::new(3);

        before_submit(&mut gpu, &mut ownership, 1, 2).unwrap();
        gpu.submit(1, 2);
        assert!(gpu.image_busy[2]);

        before_record(&mut gpu, 0).unwrap();
        before_submit(&mut gpu, &mut ownership, 0, 2).unwrap();

        // Frame 1 had to finish so image 2 could be handed to frame 0
        assert!(gpu.signaled[1]);
        gpu.submit(0, 2);
    }
}
