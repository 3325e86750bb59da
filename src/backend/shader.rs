// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Files are compiled ahead of time by
// build.rs (glslc) and read at runtime.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanDevice;

/// Decode SPIR-V bytes into aligned 32-bit words. Fails when the length is
/// not a multiple of four or the magic number is wrong.
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes)).context("Invalid SPIR-V bytecode")
}

pub fn read_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader {}", path.display()))?;
    spirv_from_bytes(&bytes).with_context(|| format!("Failed to load shader {}", path.display()))
}

pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .context("Failed to create shader module")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn decodes_little_endian_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());

        let words = spirv_from_bytes(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn accepts_big_endian_modules() {
        let bytes = SPIRV_MAGIC.to_be_bytes();

        let words = spirv_from_bytes(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC]);
    }

    #[test]
    fn rejects_truncated_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.push(0);

        assert!(spirv_from_bytes(&bytes).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_spirv("does/not/exist.spv").unwrap_err();

        assert!(format!("{err:#}").contains("does/not/exist.spv"));
    }
}
