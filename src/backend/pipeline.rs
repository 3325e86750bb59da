// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: vertex input, shaders, rasterization, depth/stencil, blending.
//
// PipelineConfig is a plain value: start from `default_config()`, pass it
// through modifiers such as `with_alpha_blending`, then hand it to
// `Pipeline::new`. Viewport and scissor are dynamic, so one pipeline
// survives swap chain recreation.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

use super::shader;
use super::VulkanDevice;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub binding_descriptions: Vec<vk::VertexInputBindingDescription>,
    pub attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,

    pub topology: vk::PrimitiveTopology,
    pub primitive_restart_enable: bool,

    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,

    pub rasterization_samples: vk::SampleCountFlags,

    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,

    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,

    pub dynamic_states: Vec<vk::DynamicState>,

    pub pipeline_layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

/// Opaque triangles, no culling, depth tested, dynamic viewport/scissor.
/// Layout, render pass and vertex input still have to be filled in.
pub fn default_config() -> PipelineConfig {
    PipelineConfig {
        binding_descriptions: Vec::new(),
        attribute_descriptions: Vec::new(),

        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: false,

        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,

        rasterization_samples: vk::SampleCountFlags::TYPE_1,

        color_blend_attachment: vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        },

        depth_test_enable: true,
        depth_write_enable: true,
        depth_compare_op: vk::CompareOp::LESS,

        dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],

        pipeline_layout: vk::PipelineLayout::null(),
        render_pass: vk::RenderPass::null(),
        subpass: 0,
    }
}

/// Standard "over" blending. Depth is still tested but no longer written,
/// so translucent geometry does not hide what is drawn after it.
pub fn with_alpha_blending(config: PipelineConfig) -> PipelineConfig {
    PipelineConfig {
        color_blend_attachment: vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::TRUE,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        },
        depth_test_enable: true,
        depth_write_enable: false,
        ..config
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        default_config()
    }
}

impl PipelineConfig {
    pub fn with_layout(self, pipeline_layout: vk::PipelineLayout) -> Self {
        Self {
            pipeline_layout,
            ..self
        }
    }

    pub fn with_render_pass(self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        Self {
            render_pass,
            subpass,
            ..self
        }
    }

    pub fn with_vertex_input(
        self,
        binding_descriptions: Vec<vk::VertexInputBindingDescription>,
        attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        Self {
            binding_descriptions,
            attribute_descriptions,
            ..self
        }
    }
}

/// Graphics pipeline plus the shader modules it was built from
pub struct Pipeline<'d> {
    device: &'d VulkanDevice,
    pipeline: vk::Pipeline,
    vert_module: vk::ShaderModule,
    frag_module: vk::ShaderModule,
}

impl<'d> Pipeline<'d> {
    pub fn new(
        device: &'d VulkanDevice,
        vert_path: impl AsRef<Path>,
        frag_path: impl AsRef<Path>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        anyhow::ensure!(
            config.pipeline_layout != vk::PipelineLayout::null(),
            "Cannot create graphics pipeline: no pipeline layout provided in config"
        );
        anyhow::ensure!(
            config.render_pass != vk::RenderPass::null(),
            "Cannot create graphics pipeline: no render pass provided in config"
        );

        let vert_code = shader::read_spirv(vert_path)?;
        let frag_code = shader::read_spirv(frag_path)?;

        // Handles start null so Drop can clean up a partial build
        let mut pipeline = Self {
            device,
            pipeline: vk::Pipeline::null(),
            vert_module: vk::ShaderModule::null(),
            frag_module: vk::ShaderModule::null(),
        };
        pipeline.vert_module = shader::create_shader_module(device, &vert_code)?;
        pipeline.frag_module = shader::create_shader_module(device, &frag_code)?;
        pipeline.pipeline = pipeline.create_graphics_pipeline(config)?;

        Ok(pipeline)
    }

    fn create_graphics_pipeline(&self, config: &PipelineConfig) -> Result<vk::Pipeline> {
        let entry_point = c"main";

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(self.vert_module)
                .name(entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(self.frag_module)
                .name(entry_point)
                .build(),
        ];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&config.binding_descriptions)
            .vertex_attribute_descriptions(&config.attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(config.topology)
            .primitive_restart_enable(config.primitive_restart_enable);

        // Set per frame through dynamic state
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .line_width(config.line_width)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(config.rasterization_samples)
            .min_sample_shading(1.0);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(config.depth_test_enable)
            .depth_write_enable(config.depth_write_enable)
            .depth_compare_op(config.depth_compare_op)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        let color_blend_attachments = [config.color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&config.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass)
            .build();

        let pipelines = unsafe {
            self.device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| e)
        .context("Failed to create graphics pipeline")?;

        pipelines
            .first()
            .copied()
            .context("Driver returned no graphics pipeline")
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline,
            )
        };
    }
}

impl Drop for Pipeline<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.vert_module, None);
            self.device.device.destroy_shader_module(self.frag_module, None);
            self.device.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn default_config_is_opaque_and_depth_tested() {
        let config = default_config();

        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert!(!config.primitive_restart_enable);
        assert_eq!(config.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(config.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(config.color_blend_attachment.blend_enable, vk::FALSE);
        assert_eq!(
            config.color_blend_attachment.color_write_mask,
            vk::ColorComponentFlags::RGBA
        );
        assert!(config.depth_test_enable && config.depth_write_enable);
        assert_eq!(config.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(
            config.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
        assert_eq!(config.pipeline_layout, vk::PipelineLayout::null());
    }

    #[test]
    fn alpha_blending_blends_over_and_stops_depth_writes() {
        let config = with_alpha_blending(default_config());
        let blend = config.color_blend_attachment;

        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert!(config.depth_test_enable);
        assert!(!config.depth_write_enable);
    }

    #[test]
    fn modifiers_keep_unrelated_fields() {
        let layout = vk::PipelineLayout::from_raw(7);
        let render_pass = vk::RenderPass::from_raw(9);

        let base = default_config().with_layout(layout).with_render_pass(render_pass, 0);
        let blended = with_alpha_blending(base.clone());

        assert_eq!(blended.pipeline_layout, layout);
        assert_eq!(blended.render_pass, render_pass);
        assert_eq!(blended.topology, base.topology);
        // The input value is untouched
        assert_eq!(base.color_blend_attachment.blend_enable, vk::FALSE);
    }

    #[test]
    fn vertex_input_is_replaced() {
        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: 20,
            input_rate: vk::VertexInputRate::VERTEX,
        };

        let config = default_config().with_vertex_input(vec![binding], vec![]);

        assert_eq!(config.binding_descriptions.len(), 1);
        assert_eq!(config.binding_descriptions[0].stride, 20);
        assert!(config.attribute_descriptions.is_empty());
    }
}
