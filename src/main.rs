// =============================================================================
// VKFRAME DEMO - spinning triangles on the frame-pacing core
// =============================================================================
//
// FRAME FLOW:
// 1. Pump window events
// 2. begin_frame: wait for this slot's fence, acquire a swap chain image
// 3. Update this slot's uniform buffer
// 4. Record the render pass
// 5. end_frame: submit, present, recreate the swap chain if it went stale
//
// Everything borrows the device, so locals are declared in dependency
// order and dropped in reverse when `run` returns. The device is drained
// first on every exit path.
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use glam::{Vec2, Vec3};
use std::rc::Rc;
use std::time::Instant;

use vkframe::backend::sync::drain_after;
use vkframe::backend::{
    Buffer, DescriptorPool, DescriptorSetLayout, DescriptorWriter, VulkanDevice,
    MAX_FRAMES_IN_FLIGHT,
};
use vkframe::config::Config;
use vkframe::logging::init_logging;
use vkframe::model::{Model, Vertex};
use vkframe::registry::Registry;
use vkframe::render_system::{FrameInfo, GlobalUbo, RenderObject, SimpleRenderSystem, Transform2d};
use vkframe::renderer::Renderer;
use vkframe::window::AppWindow;

fn main() -> Result<()> {
    let (config, load_error) = Config::load();
    init_logging(&config.debug);

    match load_error {
        Some(e) => log::warn!("Failed to load config.toml: {:#}. Using defaults.", e),
        None => log::debug!("Config: {:?}", config),
    }
    log::info!("Starting vkframe");
    log::info!("Present mode: {}", config.graphics.present_mode);

    if let Err(e) = run(&config) {
        log::error!("Fatal: {:#}", e);
        return Err(e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

fn run(config: &Config) -> Result<()> {
    let mut window = AppWindow::new(&config.window)?;
    let device = VulkanDevice::new(
        &config.window.title,
        config.debug.validation_layers,
        window.window(),
    )
    .context("Failed to initialize Vulkan")?;
    let mut renderer = Renderer::new(
        &device,
        &mut window,
        config.present_mode(),
        config.graphics.clear_color,
    )?;

    // ─────────────────────────────────────────────────────────────────────────
    // Per-frame uniform buffers and their descriptor sets
    // ─────────────────────────────────────────────────────────────────────────
    let mut global_pool = DescriptorPool::builder(&device)
        .set_max_sets(MAX_FRAMES_IN_FLIGHT as u32)
        .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, MAX_FRAMES_IN_FLIGHT as u32)
        .build()?;

    let mut ubo_buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        let mut buffer = Buffer::new(
            &device,
            std::mem::size_of::<GlobalUbo>() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            device.min_uniform_buffer_offset_alignment(),
        )?;
        buffer.map_all()?;
        ubo_buffers.push(buffer);
    }

    let global_set_layout = DescriptorSetLayout::builder(&device)
        .add_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::ALL_GRAPHICS,
        )
        .build()?;

    let mut global_descriptor_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    for buffer in &ubo_buffers {
        let set = DescriptorWriter::new(&global_set_layout, &mut global_pool)
            .write_buffer(0, buffer.descriptor_info_for_index(0))
            .build()?
            .context("Global descriptor pool is too small")?;
        global_descriptor_sets.push(set);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Render system (needs compiled shaders)
    // ─────────────────────────────────────────────────────────────────────────
    let shaders = &config.shaders;
    let render_system = if shaders.vertex.exists() && shaders.fragment.exists() {
        Some(SimpleRenderSystem::new(
            &device,
            renderer.swap_chain_render_pass(),
            &global_set_layout,
            &shaders.vertex,
            &shaders.fragment,
        )?)
    } else {
        log::warn!(
            "Shaders not found ({:?}, {:?}), only clearing the screen",
            shaders.vertex,
            shaders.fragment
        );
        None
    };

    let mut scene = Scene {
        ubo_buffers,
        global_descriptor_sets,
        render_system,
        objects: load_objects(&device)?,
    };

    // In-flight frames still reference the scene, so drain the GPU before
    // anything declared above is dropped, even when the loop fails
    let result = main_loop(config, &mut window, &mut renderer, &mut scene);
    drain_after(result, || device.wait_idle())
}

/// Per-frame GPU data the loop reads and writes
struct Scene<'d> {
    ubo_buffers: Vec<Buffer<'d>>,
    global_descriptor_sets: Vec<vk::DescriptorSet>,
    render_system: Option<SimpleRenderSystem<'d>>,
    objects: Registry<RenderObject<'d>>,
}

fn main_loop(
    config: &Config,
    window: &mut AppWindow,
    renderer: &mut Renderer<'_>,
    scene: &mut Scene<'_>,
) -> Result<()> {
    let mut current_time = Instant::now();
    let mut frame_count = 0u32;
    let mut last_fps_update = current_time;

    while !window.should_close() {
        window.poll_events();
        if window.should_close() {
            break;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(current_time).as_secs_f32();
        current_time = now;

        for (id, object) in scene.objects.iter_mut() {
            let speed = 0.5 + 0.25 * id as f32;
            object.transform.rotation =
                (object.transform.rotation + speed * frame_time) % std::f32::consts::TAU;
        }

        let Some(command_buffer) = renderer.begin_frame(window)? else {
            continue;
        };
        let frame_index = renderer.frame_index();
        let frame_info = FrameInfo {
            frame_index,
            frame_time,
            command_buffer,
            global_descriptor_set: scene.global_descriptor_sets[frame_index],
        };

        // update
        let ubo = GlobalUbo::default();
        let ubo_buffer = &mut scene.ubo_buffers[frame_index];
        ubo_buffer.write_to_index(bytemuck::bytes_of(&ubo), 0);
        ubo_buffer.flush_index(0)?;

        // render
        renderer.begin_swap_chain_render_pass(command_buffer);
        if let Some(system) = &scene.render_system {
            system.render_objects(&frame_info, &scene.objects);
        }
        renderer.end_swap_chain_render_pass(command_buffer);
        renderer.end_frame(window)?;

        frame_count += 1;
        let elapsed = now.duration_since(last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = frame_count as f32 / elapsed;
            window.window().set_title(&format!(
                "{} | {:.0} FPS | {:.2}ms",
                config.window.title,
                fps,
                1000.0 / fps
            ));
            frame_count = 0;
            last_fps_update = now;
        }
    }

    Ok(())
}

fn load_objects<'d>(device: &'d VulkanDevice) -> Result<Registry<RenderObject<'d>>> {
    let vertices = [
        Vertex {
            position: [0.0, -0.5],
            color: [1.0, 0.0, 0.0],
        },
        Vertex {
            position: [0.5, 0.5],
            color: [0.0, 1.0, 0.0],
        },
        Vertex {
            position: [-0.5, 0.5],
            color: [0.0, 0.0, 1.0],
        },
    ];
    let triangle = Rc::new(Model::new(device, &vertices, &[])?);

    let mut objects = Registry::new();
    for (translation, scale, color) in [
        (Vec2::new(-0.5, 0.0), 0.6, Vec3::new(1.0, 0.8, 0.8)),
        (Vec2::new(0.0, 0.0), 0.8, Vec3::ONE),
        (Vec2::new(0.5, 0.0), 0.6, Vec3::new(0.8, 0.8, 1.0)),
    ] {
        objects.insert(RenderObject {
            model: Rc::clone(&triangle),
            transform: Transform2d {
                translation,
                scale: Vec2::splat(scale),
                rotation: 0.0,
            },
            color,
        });
    }

    log::info!("Loaded {} objects", objects.len());
    Ok(objects)
}
