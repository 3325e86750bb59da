// Mesh data in device-local memory
//
// Vertices (and optional indices) are uploaded once through a staging
// buffer and then only bound and drawn.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};

use crate::backend::{Buffer, VulkanDevice};

/// Vertex layout consumed by shaders/simple.vert.
/// Keep the attribute descriptions in sync when changing fields.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

pub struct Model<'d> {
    device: &'d VulkanDevice,
    vertex_buffer: Buffer<'d>,
    vertex_count: u32,
    index_buffer: Option<Buffer<'d>>,
    index_count: u32,
}

impl<'d> Model<'d> {
    /// Upload geometry. An empty index list draws the vertices in order.
    pub fn new(device: &'d VulkanDevice, vertices: &[Vertex], indices: &[u32]) -> Result<Self> {
        debug_assert!(vertices.len() >= 3, "Vertex count must be at least 3");

        let vertex_count = vertices.len() as u32;
        let vertex_buffer = Buffer::staged(
            device,
            size_of::<Vertex>() as vk::DeviceSize,
            vertex_count,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(vertices),
        )
        .context("Failed to upload vertex buffer")?;

        let index_count = indices.len() as u32;
        let index_buffer = if indices.is_empty() {
            None
        } else {
            let buffer = Buffer::staged(
                device,
                size_of::<u32>() as vk::DeviceSize,
                index_count,
                vk::BufferUsageFlags::INDEX_BUFFER,
                bytemuck::cast_slice(indices),
            )
            .context("Failed to upload index buffer")?;
            Some(buffer)
        };

        log::debug!("Uploaded model: {} vertices, {} indices", vertex_count, index_count);

        Ok(Self {
            device,
            vertex_buffer,
            vertex_count,
            index_buffer,
            index_count,
        })
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[self.vertex_buffer.handle()],
                &[0],
            );
            if let Some(index_buffer) = &self.index_buffer {
                self.device.device.cmd_bind_index_buffer(
                    command_buffer,
                    index_buffer.handle(),
                    0,
                    vk::IndexType::UINT32,
                );
            }
        }
    }

    pub fn draw(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            if self.index_buffer.is_some() {
                self.device
                    .device
                    .cmd_draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0);
            } else {
                self.device
                    .device
                    .cmd_draw(command_buffer, self.vertex_count, 1, 0, 0);
            }
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 20);

        let bindings = Vertex::binding_descriptions();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stride, 20);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn attributes_match_shader_locations() {
        let attributes = Vertex::attribute_descriptions();

        let summary: Vec<_> = attributes
            .iter()
            .map(|a| (a.location, a.format, a.offset))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, vk::Format::R32G32_SFLOAT, 0),
                (1, vk::Format::R32G32B32_SFLOAT, 8),
            ]
        );
    }

    #[test]
    fn vertices_cast_to_upload_bytes() {
        let vertices = [
            Vertex {
                position: [0.0, -0.5],
                color: [1.0, 0.0, 0.0],
            },
            Vertex {
                position: [0.5, 0.5],
                color: [0.0, 1.0, 0.0],
            },
        ];

        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[20..24], &0.5f32.to_ne_bytes());
    }
}
