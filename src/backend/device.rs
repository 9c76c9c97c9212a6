// Vulkan context - instance, physical device, logical device, queues
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Physical device selection (pluggable policy, default: first enumerated)
// - Queue family resolution against the presentation surface
// - Logical device + queue retrieval

use crate::error::{Result, RendererError, VkResultExt};
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub type DebugMessenger = (DebugUtils, vk::DebugUtilsMessengerEXT);

/// Create the Vulkan instance.
///
/// Instance extensions are whatever the windowing layer demands, plus
/// debug-utils when validation is requested. The validation layer itself is
/// enabled only if the driver actually reports it; a missing layer downgrades
/// to a warning, never a failure.
pub fn create_instance(
    entry: &Entry,
    app_name: &str,
    display_handle: RawDisplayHandle,
    enable_validation: bool,
) -> Result<(ash::Instance, Option<DebugMessenger>)> {
    let app_name_cstr = CString::new(app_name).unwrap_or_default();

    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name_cstr)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(&app_name_cstr)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    // Extensions required to create a surface for this display
    let mut extensions = ash_window::enumerate_required_extensions(display_handle)
        .stage("enumerate required instance extensions")?
        .to_vec();

    #[cfg(target_os = "macos")]
    {
        // MoltenVK needs these before logical-device creation
        extensions.push(vk::KhrGetPhysicalDeviceProperties2Fn::name().as_ptr());
        extensions.push(vk::KhrPortabilityEnumerationFn::name().as_ptr());
    }

    // Validation is a diagnostic aid, not a functional dependency
    let validation = enable_validation && validation_layer_available(entry)?;
    if enable_validation && !validation {
        log::warn!("Validation layer not available, continuing without it");
    }

    let layer_names = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    };
    if validation {
        extensions.push(DebugUtils::name().as_ptr());
    }

    #[allow(unused_mut)]
    let mut create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    #[cfg(target_os = "macos")]
    {
        create_info = create_info.flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR);
    }

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .stage("create instance")?;

    let debug_utils = if validation {
        Some(setup_debug_messenger(entry, &instance)?)
    } else {
        None
    };

    Ok((instance, debug_utils))
}

fn validation_layer_available(entry: &Entry) -> Result<bool> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .stage("enumerate instance layers")?;
    Ok(supports_layer(&layers, VALIDATION_LAYER))
}

fn supports_layer(layers: &[vk::LayerProperties], wanted: &CStr) -> bool {
    layers.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == wanted
    })
}

fn setup_debug_messenger(entry: &Entry, instance: &ash::Instance) -> Result<DebugMessenger> {
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
        .stage("create debug messenger")?;

    Ok((debug_utils, messenger))
}

// =============================================================================
// DEVICE SELECTION
// =============================================================================

/// Queue family indices resolved against the active surface.
///
/// Both must be populated before logical-device creation; the resolver only
/// accepts a family that is simultaneously graphics- and present-capable.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }
}

/// Walk families in enumeration order: every graphics-capable family becomes
/// the candidate, and the first one that can also present wins outright.
pub fn resolve_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();
    for (i, family) in families.iter().enumerate() {
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(i as u32);
            if present_support.get(i).copied().unwrap_or(false) {
                indices.present = Some(i as u32);
                break;
            }
        }
    }
    indices
}

/// Plain adapter data handed to the selection policy.
pub struct AdapterInfo {
    pub properties: vk::PhysicalDeviceProperties,
}

/// Physical-device selection policy.
///
/// Returns the index of the adapter to use, or `None` when nothing qualifies.
pub trait DevicePicker {
    fn pick(&self, adapters: &[AdapterInfo]) -> Option<usize>;
}

/// Default policy: take whatever the driver enumerates first.
pub struct FirstAdapter;

impl DevicePicker for FirstAdapter {
    fn pick(&self, adapters: &[AdapterInfo]) -> Option<usize> {
        if adapters.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Owns the instance, logical device and queue handles.
///
/// The logical device must outlive every resource created from it, so
/// everything downstream holds this behind an `Arc` and the destructor runs
/// last: device, then debug messenger, then instance.
pub struct VulkanContext {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_family: u32,
    pub present_family: u32,

    debug_utils: Option<DebugMessenger>,

    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanContext {
    /// Pick a physical device, resolve its queue families against `surface`,
    /// and create the logical device with a single combined queue.
    pub fn new(
        entry: Entry,
        instance: ash::Instance,
        debug_utils: Option<DebugMessenger>,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        picker: &dyn DevicePicker,
    ) -> Result<Arc<Self>> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .stage("enumerate physical devices")?;
        if physical_devices.is_empty() {
            return Err(RendererError::NoAdapter);
        }

        let adapters: Vec<AdapterInfo> = physical_devices
            .iter()
            .map(|&pd| AdapterInfo {
                properties: unsafe { instance.get_physical_device_properties(pd) },
            })
            .collect();

        let picked = picker.pick(&adapters).ok_or(RendererError::NoAdapter)?;
        let physical_device = physical_devices[picked];
        let properties = adapters[picked].properties;

        log::info!(
            "Selected GPU: {} ({:?})",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
            properties.device_type,
        );
        log::info!(
            "API version: {}.{}.{}, driver version: {}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version),
            properties.driver_version,
        );

        // Resolve a combined graphics+present family
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let present_support = (0..families.len() as u32)
            .map(|i| {
                unsafe {
                    surface_loader.get_physical_device_surface_support(physical_device, i, surface)
                }
                .stage("query surface support")
            })
            .collect::<Result<Vec<bool>>>()?;

        let indices = resolve_queue_families(&families, &present_support);
        let (graphics_family, present_family) = match (indices.graphics, indices.present) {
            (Some(g), Some(p)) => (g, p),
            _ => return Err(RendererError::IncompleteQueueFamilies),
        };

        let device = Self::create_logical_device(&instance, physical_device, graphics_family)?;

        // Same family, so the single created queue serves both roles
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            _entry: entry,
            graphics_queue,
            present_queue,
            graphics_family,
            present_family,
            debug_utils,
            properties,
            memory_properties,
        }))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_family: u32,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        // Graphics and present families coincide by construction, so a single
        // queue-create request covers both. Divergent families would need one
        // request per family; this renderer does not implement that.
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_family)
            .queue_priorities(&queue_priorities)
            .build();

        #[allow(unused_mut)]
        let mut extensions = vec![khr::Swapchain::name().as_ptr()];
        #[cfg(target_os = "macos")]
        {
            extensions.push(vk::KhrPortabilitySubsetFn::name().as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::default();
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .stage("create logical device")
    }

    /// Wait for the device to be idle (e.g. before teardown)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.stage("device wait idle")
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan context");

        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_device(None);
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn resolution_picks_lowest_combined_family() {
        // Family 0: transfer only. Family 1: graphics, no present.
        // Family 2: graphics + present. Family 3: also qualifies but is later.
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let present = [true, false, true, true];

        let indices = resolve_queue_families(&families, &present);
        assert!(indices.is_complete());
        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn resolution_short_circuits_at_first_match() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let present = [true, true];

        let indices = resolve_queue_families(&families, &present);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
    }

    #[test]
    fn resolution_incomplete_when_no_family_can_present() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let present = [false];

        let indices = resolve_queue_families(&families, &present);
        assert!(!indices.is_complete());
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
    }

    #[test]
    fn present_only_families_are_ignored() {
        // A family that can present but not draw must never satisfy resolution.
        let families = [family(vk::QueueFlags::TRANSFER)];
        let present = [true];

        let indices = resolve_queue_families(&families, &present);
        assert!(!indices.is_complete());
    }

    #[test]
    fn first_adapter_policy() {
        assert_eq!(FirstAdapter.pick(&[]), None);

        let adapters = vec![
            AdapterInfo {
                properties: vk::PhysicalDeviceProperties::default(),
            },
            AdapterInfo {
                properties: vk::PhysicalDeviceProperties::default(),
            },
        ];
        assert_eq!(FirstAdapter.pick(&adapters), Some(0));
    }

    #[test]
    fn layer_lookup_matches_exact_name() {
        let mut layer = vk::LayerProperties::default();
        let name = VALIDATION_LAYER.to_bytes_with_nul();
        for (dst, &src) in layer.layer_name.iter_mut().zip(name) {
            *dst = src as std::os::raw::c_char;
        }

        assert!(supports_layer(&[layer], VALIDATION_LAYER));
        assert!(!supports_layer(&[layer], c"VK_LAYER_other"));
        assert!(!supports_layer(&[], VALIDATION_LAYER));
    }
}
