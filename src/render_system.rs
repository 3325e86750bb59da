// Push-constant render system
//
// One pipeline, one global descriptor set (set 0) and a per-object push
// constant block. Objects come from a Registry and are drawn in id order.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat2, Vec2, Vec3};
use std::mem::size_of;
use std::path::Path;
use std::rc::Rc;

use crate::backend::pipeline::default_config;
use crate::backend::{DescriptorSetLayout, Pipeline, VulkanDevice};
use crate::model::{Model, Vertex};
use crate::registry::Registry;

/// Matches the `Push` block in shaders/simple.vert (std430 offsets 0/16/32)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimplePushConstantData {
    pub transform: [f32; 4],
    pub offset: [f32; 2],
    _pad0: [f32; 2],
    pub color: [f32; 3],
    _pad1: f32,
}

impl SimplePushConstantData {
    pub fn new(transform: Mat2, offset: Vec2, color: Vec3) -> Self {
        Self {
            transform: transform.to_cols_array(),
            offset: offset.to_array(),
            _pad0: [0.0; 2],
            color: color.to_array(),
            _pad1: 0.0,
        }
    }
}

/// Per-frame uniform data bound at set 0, binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalUbo {
    pub tint: [f32; 4],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self { tint: [1.0; 4] }
    }
}

/// Everything a render system needs to record one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub frame_index: usize,
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    pub global_descriptor_set: vk::DescriptorSet,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2d {
    pub translation: Vec2,
    pub scale: Vec2,
    pub rotation: f32,
}

impl Default for Transform2d {
    fn default() -> Self {
        Self {
            translation: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
        }
    }
}

impl Transform2d {
    /// Rotation applied after scale
    pub fn mat2(&self) -> Mat2 {
        Mat2::from_scale_angle(self.scale, self.rotation)
    }
}

pub struct RenderObject<'d> {
    pub model: Rc<Model<'d>>,
    pub transform: Transform2d,
    pub color: Vec3,
}

pub struct SimpleRenderSystem<'d> {
    device: &'d VulkanDevice,
    pipeline_layout: vk::PipelineLayout,
    pipeline: Option<Pipeline<'d>>,
}

impl<'d> SimpleRenderSystem<'d> {
    pub fn new(
        device: &'d VulkanDevice,
        render_pass: vk::RenderPass,
        global_set_layout: &DescriptorSetLayout<'d>,
        vert_path: impl AsRef<Path>,
        frag_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let mut system = Self {
            device,
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: None,
        };
        system.create_pipeline_layout(global_set_layout)?;
        system.create_pipeline(render_pass, vert_path.as_ref(), frag_path.as_ref())?;
        Ok(system)
    }

    fn create_pipeline_layout(&mut self, global_set_layout: &DescriptorSetLayout<'d>) -> Result<()> {
        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: size_of::<SimplePushConstantData>() as u32,
        }];
        let set_layouts = [global_set_layout.handle()];

        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        self.pipeline_layout = unsafe {
            self.device
                .device
                .create_pipeline_layout(&layout_info, None)
        }
        .context("Failed to create pipeline layout")?;
        Ok(())
    }

    fn create_pipeline(
        &mut self,
        render_pass: vk::RenderPass,
        vert_path: &Path,
        frag_path: &Path,
    ) -> Result<()> {
        let config = default_config()
            .with_vertex_input(Vertex::binding_descriptions(), Vertex::attribute_descriptions())
            .with_layout(self.pipeline_layout)
            .with_render_pass(render_pass, 0);

        self.pipeline = Some(Pipeline::new(self.device, vert_path, frag_path, &config)?);
        Ok(())
    }

    pub fn render_objects(&self, frame_info: &FrameInfo, objects: &Registry<RenderObject<'d>>) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        let command_buffer = frame_info.command_buffer;
        let device = &self.device.device;

        pipeline.bind(command_buffer);

        unsafe {
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[frame_info.global_descriptor_set],
                &[],
            );
        }

        for (_, object) in objects.iter() {
            let push = SimplePushConstantData::new(
                object.transform.mat2(),
                object.transform.translation,
                object.color,
            );

            unsafe {
                device.cmd_push_constants(
                    command_buffer,
                    self.pipeline_layout,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
            }
            object.model.bind(command_buffer);
            object.model.draw(command_buffer);
        }
    }
}

impl Drop for SimpleRenderSystem<'_> {
    fn drop(&mut self) {
        // Pipeline goes before the layout it was built against
        self.pipeline = None;
        unsafe {
            self.device
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}
