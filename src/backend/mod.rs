// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics
// Ownership: every object borrows the device (`&'d VulkanDevice`), so the
// device is created first and dropped last

pub mod buffer;
pub mod descriptors;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::Buffer;
pub use descriptors::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
pub use device::VulkanDevice;
pub use pipeline::{Pipeline, PipelineConfig};
pub use swapchain::{AcquireStatus, PresentStatus, SwapChain};
pub use sync::MAX_FRAMES_IN_FLIGHT;
