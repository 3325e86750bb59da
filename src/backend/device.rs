// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Presentation surface for the platform window
// - Physical device selection (first GPU that can render and present)
// - Logical device, graphics/present queues, command pool
// - Memory type / format queries and raw buffer/image allocation
// - One-off synchronous command submission for transfers
//
// Created once at startup and destroyed last: every other backend object
// borrows it (`&VulkanDevice`), so the borrow checker keeps it alive
// until all dependents are gone.

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr, CString};

use super::surface;
use crate::error::FatalError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Queue families able to run graphics work and present to the surface.
/// Both may name the same family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, one queue is created per entry
    pub fn unique(&self) -> Vec<u32> {
        self.graphics
            .into_iter()
            .chain(self.present)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Surface capabilities as reported for one physical device
#[derive(Debug, Clone)]
pub struct SwapChainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapChainSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    // Presentation surface
    surface: vk::SurfaceKHR,
    surface_loader: khr::Surface,

    // Queue handles (graphics and present may alias)
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,

    command_pool: vk::CommandPool,

    // Debug utils (if validation enabled)
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Create the device for a platform window.
    ///
    /// Every step is fatal on failure. Validation is best-effort: when the
    /// layer is requested but not installed the device is created without it.
    pub fn new<W>(app_name: &str, enable_validation: bool, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        log::info!("Creating Vulkan device: {}", app_name);

        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let enable_validation = enable_validation && Self::validation_layer_available(&entry)?;

        // Step 2: Create instance
        let instance = Self::create_instance(&entry, app_name, display_handle, enable_validation)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // Step 4: Create the presentation surface
        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = unsafe {
            surface::create_surface(&entry, &instance, display_handle, window_handle)
        }?;

        // Step 5: Pick physical device (GPU)
        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;
        let (graphics_queue_family, present_queue_family) =
            match (queue_families.graphics, queue_families.present) {
                (Some(graphics), Some(present)) => (graphics, present),
                _ => return Err(FatalError::NoSuitableGpu.into()),
            };

        // Step 6: Create logical device and queues
        let device = Self::create_logical_device(
            &instance,
            physical_device,
            &queue_families,
            enable_validation,
        )?;
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_queue_family, 0) };

        // Step 7: Create command pool
        let command_pool = Self::create_command_pool(&device, graphics_queue_family)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics {}, present {}",
            graphics_queue_family,
            present_queue_family
        );

        Ok(Self {
            device,
            physical_device,
            instance,
            _entry: entry,
            surface,
            surface_loader,
            graphics_queue,
            graphics_queue_family,
            present_queue,
            present_queue_family,
            command_pool,
            debug_utils,
            properties,
            memory_properties,
        })
    }

    fn validation_layer_available(entry: &Entry) -> Result<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }
            .context("Failed to enumerate instance layers")?;
        let available = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

        if !available {
            log::warn!(
                "Validation requested but {} is not installed; continuing without it",
                VALIDATION_LAYER.to_string_lossy()
            );
        }
        Ok(available)
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display_handle: raw_window_handle::RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"vkframe";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        // Surface extensions for this window system, plus debug utils
        let mut extensions = surface::required_instance_extensions(display_handle)?;
        if enable_validation {
            extensions.push(DebugUtils::name());
        }
        let extension_ptrs: Vec<*const c_char> =
            extensions.iter().map(|name| name.as_ptr()).collect();

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to set up debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }
        log::info!("Device count: {}", devices.len());

        // First device that satisfies every requirement wins
        first_suitable(devices, |&device| {
            Self::check_device_suitable(instance, surface_loader, surface, device)
        })
        .ok_or_else(|| FatalError::NoSuitableGpu.into())
    }

    fn check_device_suitable(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> Result<Option<QueueFamilyIndices>> {
        let props = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let indices = find_queue_families(&families, |index| {
            unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) }
                .unwrap_or(false)
        });
        if !indices.is_complete() {
            log::debug!("Skipping {}: no graphics or present queue family", name);
            return Ok(None);
        }

        let available = unsafe { instance.enumerate_device_extension_properties(device) }
            .context("Failed to enumerate device extensions")?;
        let missing = missing_extensions(&available, &required_device_extensions());
        if !missing.is_empty() {
            log::debug!("Skipping {}: missing extensions {:?}", name, missing);
            return Ok(None);
        }

        // Only meaningful once the swapchain extension is known to exist
        let support = query_swap_chain_support(surface_loader, device, surface)?;
        if !support.is_adequate() {
            log::debug!("Skipping {}: no surface formats or present modes", name);
            return Ok(None);
        }

        let features = unsafe { instance.get_physical_device_features(device) };
        if features.sampler_anisotropy != vk::TRUE {
            log::debug!("Skipping {}: sampler anisotropy unsupported", name);
            return Ok(None);
        }

        Ok(Some(indices))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
        enable_validation: bool,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };

        let extension_ptrs: Vec<*const c_char> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        // Device layers are ignored by current loaders, set for older ones
        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        Ok(device)
    }

    fn create_command_pool(device: &ash::Device, graphics_queue_family: u32) -> Result<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            // TRANSIENT: Command buffers are short-lived
            // RESET: Allow individual buffer reset
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );

        unsafe { device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn swap_chain_support(&self) -> Result<SwapChainSupport> {
        query_swap_chain_support(&self.surface_loader, self.physical_device, self.surface)
    }

    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    /// Index of the first memory type allowed by `type_filter` that has all
    /// of `properties`. No match is a configuration error.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        Ok(find_memory_type(&self.memory_properties, type_filter, properties)?)
    }

    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format> {
        let format = find_supported_format(candidates, tiling, features, |format| unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        })?;
        Ok(format)
    }

    pub fn find_depth_format(&self) -> Result<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    // =========================================================================
    // ALLOCATION
    // =========================================================================

    /// Create a buffer and bind it to freshly allocated memory
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = release_on_error(self.allocate(requirements, properties), || unsafe {
            self.device.destroy_buffer(buffer, None);
        })
        .context("Failed to allocate buffer memory")?;

        release_on_error(
            unsafe { self.device.bind_buffer_memory(buffer, memory, 0) },
            || unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            },
        )
        .context("Failed to bind buffer memory")?;

        Ok((buffer, memory))
    }

    /// Create an image and bind it to freshly allocated memory
    pub fn create_image_with_info(
        &self,
        image_info: &vk::ImageCreateInfo,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Image, vk::DeviceMemory)> {
        let image = unsafe { self.device.create_image(image_info, None) }
            .context("Failed to create image")?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let memory = release_on_error(self.allocate(requirements, properties), || unsafe {
            self.device.destroy_image(image, None);
        })
        .context("Failed to allocate image memory")?;

        release_on_error(
            unsafe { self.device.bind_image_memory(image, memory, 0) },
            || unsafe {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
            },
        )
        .context("Failed to bind image memory")?;

        Ok((image, memory))
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        let memory_type_index = self.find_memory_type(requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { self.device.allocate_memory(&alloc_info, None) }?;
        Ok(memory)
    }

    // =========================================================================
    // ONE-OFF COMMANDS
    // =========================================================================
    //
    // Synchronous: the calling thread blocks until the graphics queue is idle.
    // Meant for load-time transfers, never for the per-frame path.

    pub fn begin_single_time_commands(&self) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(self.command_pool)
            .command_buffer_count(1);

        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate single-time command buffer")?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) } {
            unsafe {
                self.device
                    .free_command_buffers(self.command_pool, &[command_buffer])
            };
            return Err(e).context("Failed to begin single-time command buffer");
        }

        Ok(command_buffer)
    }

    /// Submit, wait for completion and free. The buffer is freed even when
    /// submission fails.
    pub fn end_single_time_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let result = self.submit_and_wait(command_buffer);
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[command_buffer])
        };
        result
    }

    fn submit_and_wait(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device
                .end_command_buffer(command_buffer)
                .context("Failed to record single-time command buffer")?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

            self.device
                .queue_submit(self.graphics_queue, &[submit_info.build()], vk::Fence::null())
                .context("Failed to submit single-time command buffer")?;
            self.device
                .queue_wait_idle(self.graphics_queue)
                .context("Failed waiting for single-time command buffer")?;
        }
        Ok(())
    }

    /// Record into a one-off command buffer and block until it has executed
    pub fn immediate_submit<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let command_buffer = self.begin_single_time_commands()?;
        record(&self.device, command_buffer);
        self.end_single_time_commands(command_buffer)
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> Result<()> {
        self.immediate_submit(|device, command_buffer| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { device.cmd_copy_buffer(command_buffer, src, dst, &[region]) };
        })
    }

    /// Copy tightly packed texels into an image already in TRANSFER_DST_OPTIMAL
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
        layer_count: u32,
    ) -> Result<()> {
        self.immediate_submit(|device, command_buffer| {
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                },
            };
            unsafe {
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                )
            };
        })
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed waiting for device idle")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Drain anything still in flight
        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// =============================================================================
// PURE HELPERS
// =============================================================================

fn query_swap_chain_support(
    surface_loader: &khr::Surface,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SwapChainSupport> {
    unsafe {
        Ok(SwapChainSupport {
            capabilities: surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .context("Failed to query surface capabilities")?,
            formats: surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .context("Failed to query surface formats")?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .context("Failed to query surface present modes")?,
        })
    }
}

/// Run `release` when `result` is an error, so a half-built resource
/// does not leak
pub fn release_on_error<T, E>(result: Result<T, E>, release: impl FnOnce()) -> Result<T, E> {
    if result.is_err() {
        release();
    }
    result
}

/// First candidate `check` accepts. A candidate whose check fails is
/// logged and skipped, so one broken adapter does not end the search.
pub fn first_suitable<C, T>(
    candidates: impl IntoIterator<Item = C>,
    mut check: impl FnMut(&C) -> Result<Option<T>>,
) -> Option<(C, T)> {
    for candidate in candidates {
        match check(&candidate) {
            Ok(Some(found)) => return Some((candidate, found)),
            Ok(None) => {}
            Err(e) => log::warn!("Skipping device: {:#}", e),
        }
    }
    None
}

/// Locate graphics and present capable queue families.
///
/// `supports_present` is asked for each family index with a non-zero queue
/// count; the search stops once both roles are filled.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.queue_count == 0 {
            continue;
        }
        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }
        if indices.present.is_none() && supports_present(index) {
            indices.present = Some(index);
        }
        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Required extension names absent from `available`
pub fn missing_extensions<'a>(
    available: &[vk::ExtensionProperties],
    required: &[&'a CStr],
) -> Vec<&'a CStr> {
    let available: BTreeSet<&CStr> = available
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
        .collect();

    required
        .iter()
        .copied()
        .filter(|name| !available.contains(name))
        .collect()
}

pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, FatalError> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            type_filter & (1u32 << i) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(FatalError::NoSuitableMemoryType {
            type_filter,
            required,
        })
}

/// First candidate whose `tiling` features contain `features`.
/// `properties_of` queries the format properties of one candidate.
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties_of: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format, FatalError> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties_of(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| FatalError::UnsupportedFormat {
            candidates: candidates.to_vec(),
            tiling,
            features,
        })
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
