//! vkframe: a Vulkan device, swap chain and frame-pacing core.
//!
//! Construction order is ownership order. `VulkanDevice` comes first and
//! everything else borrows it, so teardown runs in reverse automatically:
//!
//! ```text
//! VulkanDevice
//!   ├── Buffer / DescriptorPool / DescriptorSetLayout / Model
//!   ├── Renderer ── SwapChain ── FrameSync
//!   └── SimpleRenderSystem ── Pipeline
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod registry;
pub mod render_system;
pub mod renderer;
pub mod window;
