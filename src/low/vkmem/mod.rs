pub use ash::version::{DeviceV1_0, InstanceV1_0};
use ash::vk;
use ash::vk::DeviceMemory;

use log::debug;

use std::rc::Rc;

use crate::low::vkstate::VulkanState;

/// One device-memory allocation, shared by every buffer of the job.
pub struct VkMem {
    pub size: u64,
    pub index: u32,
    pub mem: DeviceMemory,
    state: Rc<VulkanState>,
}

/// A storage buffer plus the offset it is bound at inside a `VkMem`.
pub struct VkBuffer {
    pub size: u64,
    pub offset: u64,
    pub buffer: vk::Buffer,
    state: Rc<VulkanState>,
}

impl VkBuffer {
    pub fn new(state: Rc<VulkanState>, size: u64, usage: vk::BufferUsageFlags) -> Self {
        let queue_indices = [state.queue_family_index];
        let buffer_create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_indices);

        let buffer = unsafe {
            state
                .device
                .create_buffer(&buffer_create_info, None)
                .expect("[ERR] Could not create buffer.")
        };

        VkBuffer {
            size,
            offset: 0,
            buffer,
            state,
        }
    }

    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe {
            self.state
                .device
                .get_buffer_memory_requirements(self.buffer)
        }
    }

    pub fn bind(&mut self, memory: DeviceMemory, offset: u64) {
        unsafe {
            self.state
                .device
                .bind_buffer_memory(self.buffer, memory, offset)
                .expect("[ERR] Could not bind buffer memory.");
        }
        self.offset = offset;
    }
}

impl Drop for VkBuffer {
    fn drop(&mut self) {
        unsafe {
            self.state.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Round `offset` up to the next multiple of `alignment`.
pub fn align_offset(offset: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return offset;
    }
    let rest = offset % alignment;
    if rest == 0 {
        offset
    } else {
        offset + alignment - rest
    }
}

/// Pack `(size, alignment)` regions back to back without overlap.
/// Returns the total span and the offset of every region.
pub fn pack_regions(regions: &[(u64, u64)]) -> (u64, Vec<u64>) {
    let mut offsets = Vec::with_capacity(regions.len());
    let mut cursor = 0;
    for (size, alignment) in regions {
        let offset = align_offset(cursor, *alignment);
        offsets.push(offset);
        cursor = offset + size;
    }
    (cursor, offsets)
}

/// Compute one allocation layout for a group of buffers, honouring each
/// buffer's reported size and alignment requirements.
pub fn compute_non_overlapping_buffer_alignment(buffers: &[&VkBuffer]) -> (u64, Vec<u64>) {
    let regions: Vec<(u64, u64)> = buffers
        .iter()
        .map(|buffer| {
            let requirements = buffer.memory_requirements();
            (requirements.size, requirements.alignment)
        })
        .collect();
    pack_regions(&regions)
}

/// The memory types legal for every buffer in the group.
pub fn shared_memory_type_mask(buffers: &[&VkBuffer]) -> u32 {
    buffers.iter().fold(!0u32, |mask, buffer| {
        mask & buffer.memory_requirements().memory_type_bits
    })
}

impl VkMem {
    /// Allocate `size` bytes from a memory type that is host visible and
    /// host coherent, so the host can read results without staging copies.
    /// `type_mask` restricts the choice to types legal for the buffers the
    /// allocation will back.
    pub fn find_mem(state: Rc<VulkanState>, size: u64, type_mask: u32) -> Option<Self> {
        let mem_props = unsafe {
            state
                .instance
                .get_physical_device_memory_properties(state.physical_device)
        };

        let mut mem_index: Option<u32> = None;
        for i in 0..mem_props.memory_type_count {
            let mem_type = mem_props.memory_types[i as usize];
            let heap_size = mem_props.memory_heaps[mem_type.heap_index as usize].size;
            debug!(
                "Mem {} max heap size: {} Mio",
                i,
                heap_size as f64 / 1024.0 / 1024.0
            );
            if (type_mask >> i) & 1 == 1
                && mem_type.property_flags.contains(
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )
                && heap_size > size
            {
                mem_index = Some(i);
                break;
            }
        }

        let mem_index = mem_index?;
        let allocate_nfo = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(mem_index)
            .build();
        let memory = unsafe {
            state
                .device
                .allocate_memory(&allocate_nfo, None)
                .expect("[ERR] Could not allocate memory on the device.")
        };

        Some(VkMem {
            size,
            index: mem_index,
            mem: memory,
            state,
        })
    }

    /// Copy a host slice into a buffer bound to this allocation.
    pub fn map_buffer<T: Copy>(&self, data: &[T], buffer: &VkBuffer) {
        let size = (data.len() * std::mem::size_of::<T>()) as u64;
        let mapped: *mut T = unsafe {
            self.state
                .device
                .map_memory(self.mem, buffer.offset, size, vk::MemoryMapFlags::empty())
                .expect("[ERR] Could not map memory.") as *mut T
        };

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
            self.state.device.unmap_memory(self.mem);
        }
    }

    /// Read a whole buffer bound to this allocation back to the host.
    pub fn get_buffer<T: Copy>(&self, buffer: &VkBuffer) -> Vec<T> {
        let capacity = buffer.size as usize / std::mem::size_of::<T>();
        let mut output: Vec<T> = Vec::with_capacity(capacity);
        let mapped: *const T = unsafe {
            self.state
                .device
                .map_memory(
                    self.mem,
                    buffer.offset,
                    buffer.size,
                    vk::MemoryMapFlags::empty(),
                )
                .expect("[ERR] Could not map memory.") as *const T
        };

        unsafe {
            std::ptr::copy_nonoverlapping(mapped, output.as_mut_ptr(), capacity);
            output.set_len(capacity);
            self.state.device.unmap_memory(self.mem);
        }
        output
    }
}

impl Drop for VkMem {
    fn drop(&mut self) {
        unsafe {
            self.state.device.free_memory(self.mem, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_offset_rounds_up_to_multiples() {
        assert_eq!(align_offset(0, 256), 0);
        assert_eq!(align_offset(1, 256), 256);
        assert_eq!(align_offset(256, 256), 256);
        assert_eq!(align_offset(257, 256), 512);
        assert_eq!(align_offset(42, 0), 42);
    }

    #[test]
    fn pack_regions_respects_alignment() {
        let (total, offsets) = pack_regions(&[(256, 256), (100, 256), (100, 256), (64, 16)]);
        assert_eq!(offsets, vec![0, 256, 512, 624]);
        assert_eq!(total, 688);
    }

    #[test]
    fn pack_regions_of_four_equal_buffers() {
        // Four equally sized float buffers, the demo's layout.
        let region = (64 * 4, 64);
        let (total, offsets) = pack_regions(&[region; 4]);
        assert_eq!(offsets, vec![0, 256, 512, 768]);
        assert_eq!(total, 1024);
    }
}
