pub use ash::version::{DeviceV1_0, EntryV1_0, InstanceV1_0};
use ash::vk::{self, PhysicalDevice};
use ash::{Device, Entry, Instance};

use crate::utils::cstr2string;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};

use ash::extensions::ext::DebugReport;

use log::{debug, info, warn};

/// Vulkan objects that live for the whole process. Everything else in the
/// crate holds this state through an `Rc` and therefore drops before it.
pub struct VulkanState {
    pub entry: Entry,
    pub instance: Instance,
    pub physical_device: PhysicalDevice,
    pub device: Device,
    pub queue_family_index: u32,
    debug: Option<(DebugReport, vk::DebugReportCallbackEXT)>,
}

impl Drop for VulkanState {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().unwrap();
            self.device.destroy_device(None);
            if let Some((loader, callback)) = self.debug.take() {
                loader.destroy_debug_report_callback(callback, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

pub fn print_work_limits(vulkan: &VulkanState) {
    let physical_device_props = unsafe {
        vulkan
            .instance
            .get_physical_device_properties(vulkan.physical_device)
    };

    let physical_limits = physical_device_props.limits;
    let work_group_count = physical_limits.max_compute_work_group_count;
    let work_group_size = physical_limits.max_compute_work_group_size;
    let work_group_invocation = physical_limits.max_compute_work_group_invocations;

    info!(
        "Device max work group count: [{}, {}, {}]",
        work_group_count[0], work_group_count[1], work_group_count[2]
    );
    info!(
        "Device max work group size: [{}, {}, {}]",
        work_group_size[0], work_group_size[1], work_group_size[2]
    );
    info!(
        "Device max work group invocation: {}",
        work_group_invocation
    );
    info!(
        "minStorageBufferOffset: {}",
        physical_limits.min_storage_buffer_offset_alignment
    );
}

unsafe extern "system" fn vulkan_debug_callback(
    _: vk::DebugReportFlagsEXT,
    _: vk::DebugReportObjectTypeEXT,
    _: u64,
    _: usize,
    _: i32,
    _: *const c_char,
    p_message: *const c_char,
    _: *mut c_void,
) -> u32 {
    warn!("\n{:?}", CStr::from_ptr(p_message));
    vk::FALSE
}

const VALIDATION_LAYERS: [&str; 2] = [
    "VK_LAYER_KHRONOS_validation",
    "VK_LAYER_LUNARG_standard_validation",
];

/// The first known validation layer this Vulkan install ships, if any.
/// The demo must also run on machines without the SDK, so a missing layer
/// is not an error.
fn available_validation_layer(entry: &Entry) -> Option<CString> {
    let available = entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default();
    for wanted in VALIDATION_LAYERS.iter() {
        if available
            .iter()
            .any(|layer| cstr2string(&layer.layer_name) == *wanted)
        {
            return Some(CString::new(*wanted).unwrap());
        }
    }
    None
}

/// Queue family of `device` supporting both compute and transfer, if any.
fn compute_queue_family(instance: &Instance, device: PhysicalDevice) -> Option<u32> {
    unsafe {
        instance
            .get_physical_device_queue_family_properties(device)
            .iter()
            .enumerate()
            .find(|(_, nfo)| {
                nfo.queue_flags.contains(vk::QueueFlags::COMPUTE)
                    && nfo.queue_flags.contains(vk::QueueFlags::TRANSFER)
            })
            .map(|(index, _)| index as u32)
    }
}

/// Pick a physical device without user interaction: keep the devices that
/// expose a compute queue, prefer a discrete GPU, otherwise take the first.
fn pick_physical_device(instance: &Instance) -> (PhysicalDevice, u32) {
    let devices = unsafe {
        instance
            .enumerate_physical_devices()
            .expect("[ERR] Could not enumerate physical devices.")
    };

    let mut candidates: Vec<(PhysicalDevice, u32, vk::PhysicalDeviceProperties)> = Vec::new();
    for device in devices {
        if let Some(queue_index) = compute_queue_family(instance, device) {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            candidates.push((device, queue_index, properties));
        }
    }

    if candidates.is_empty() {
        panic!("[ERR] Could not find a device with a compute queue.");
    }

    let chosen = candidates
        .iter()
        .position(|(_, _, props)| props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
        .unwrap_or(0);
    let (device, queue_index, properties) = candidates.swap_remove(chosen);
    info!(
        "Using device {} (queue family {}).",
        cstr2string(&properties.device_name),
        queue_index
    );
    (device, queue_index)
}

pub fn init_vulkan() -> VulkanState {
    let entry = Entry::new().expect("[ERR] Could not load the Vulkan library.");

    let validation = available_validation_layer(&entry);
    let layers_names_raw: Vec<*const c_char> =
        validation.iter().map(|name| name.as_ptr()).collect();
    let extension_names_raw: Vec<*const c_char> = if validation.is_some() {
        vec![DebugReport::name().as_ptr()]
    } else {
        Vec::new()
    };

    let app_name = CString::new("muladd").unwrap();
    let app_info = vk::ApplicationInfo::builder()
        .api_version(vk::make_version(1, 0, 0))
        .application_name(&app_name)
        .application_version(vk::make_version(0, 1, 0));
    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_layer_names(&layers_names_raw)
        .enabled_extension_names(&extension_names_raw);

    let instance: Instance = unsafe {
        entry
            .create_instance(&create_info, None)
            .expect("[ERR] Could not create the Vulkan instance.")
    };

    let debug = match validation {
        Some(layer) => {
            debug!("Validation layer {:?} enabled.", layer);
            let debug_info = vk::DebugReportCallbackCreateInfoEXT::builder()
                .flags(
                    vk::DebugReportFlagsEXT::ERROR
                        | vk::DebugReportFlagsEXT::WARNING
                        | vk::DebugReportFlagsEXT::PERFORMANCE_WARNING,
                )
                .pfn_callback(Some(vulkan_debug_callback));
            let loader = DebugReport::new(&entry, &instance);
            let callback = unsafe {
                loader
                    .create_debug_report_callback(&debug_info, None)
                    .expect("[ERR] Could not register the debug report callback.")
            };
            Some((loader, callback))
        }
        None => {
            debug!("No validation layer available, running without one.");
            None
        }
    };

    let (physical, queue_index) = pick_physical_device(&instance);

    let features = vk::PhysicalDeviceFeatures {
        ..Default::default()
    };

    let queue_create_info = [vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_index)
        .queue_priorities(&[1.0])
        .build()];

    let device_create_info_builder = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_create_info)
        .enabled_features(&features)
        .enabled_extension_names(&[]);
    let device: Device = unsafe {
        instance
            .create_device(physical, &device_create_info_builder, None)
            .expect("[ERR] Could not create the logical device.")
    };

    VulkanState {
        entry,
        instance,
        physical_device: physical,
        device,
        queue_family_index: queue_index,
        debug,
    }
}
