// Fatal error kinds
//
// Everything fallible returns anyhow::Result. The variants below are the
// configuration failures a caller may want to recognize after the fact
// (they travel inside anyhow::Error and can be downcast). None of them is
// retryable: the environment cannot satisfy a hard requirement.

use ash::vk;
use thiserror::Error;

use crate::backend::swapchain::SwapChainFormats;

#[derive(Debug, Error)]
pub enum FatalError {
    #[error("No memory type matches filter {type_filter:#034b} with properties {required:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("None of {candidates:?} supports {features:?} with {tiling:?} tiling")]
    UnsupportedFormat {
        candidates: Vec<vk::Format>,
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    },

    #[error("Swap chain image or depth format has changed ({previous:?} -> {current:?})")]
    FormatMismatch {
        previous: SwapChainFormats,
        current: SwapChainFormats,
    },

    #[error("No GPU supports the required queue families, extensions and surface")]
    NoSuitableGpu,

    #[error("Window system {0} is not supported for surface creation")]
    UnsupportedPlatform(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_survive_anyhow_round_trip() {
        let err: anyhow::Error = FatalError::NoSuitableGpu.into();
        let err = err.context("Failed to create device");

        assert!(matches!(
            err.downcast_ref::<FatalError>(),
            Some(FatalError::NoSuitableGpu)
        ));
    }

    #[test]
    fn format_mismatch_names_both_formats() {
        let err = FatalError::FormatMismatch {
            previous: SwapChainFormats {
                color: vk::Format::B8G8R8A8_SRGB,
                depth: vk::Format::D32_SFLOAT,
            },
            current: SwapChainFormats {
                color: vk::Format::R8G8B8A8_UNORM,
                depth: vk::Format::D32_SFLOAT,
            },
        };

        let message = err.to_string();
        assert!(message.contains("B8G8R8A8_SRGB"));
        assert!(message.contains("R8G8B8A8_UNORM"));
    }
}
