use crate::low::vkshader::VkShader;
use crate::low::vkstate::VulkanState;

use crate::ash::version::DeviceV1_0;
use ash::vk;
use std::cell::RefCell;
use std::rc::Rc;

/// Descriptor pool and sets for one shader's layout.
pub struct VkDescriptor {
    pub pool_sizes: Vec<vk::DescriptorPoolSize>,
    pub pool: Option<vk::DescriptorPool>,
    pub set: Vec<vk::DescriptorSet>,
    state: Rc<VulkanState>,
    shader: Rc<RefCell<VkShader>>,
}

impl VkDescriptor {
    pub fn new(state: Rc<VulkanState>, shader: Rc<RefCell<VkShader>>) -> Self {
        VkDescriptor {
            pool_sizes: Vec::new(),
            pool: None,
            set: Vec::new(),
            state,
            shader,
        }
    }

    pub fn add_pool_size(&mut self, count: u32, descriptor_type: vk::DescriptorType) {
        let descriptor_pool_size = vk::DescriptorPoolSize::builder()
            .descriptor_count(count)
            .ty(descriptor_type);
        self.pool_sizes.push(descriptor_pool_size.build());
    }

    pub fn create_pool(&mut self, max_sets: u32) {
        let descriptor_pool_create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&self.pool_sizes);
        let descriptor_pool = unsafe {
            self.state
                .device
                .create_descriptor_pool(&descriptor_pool_create_info, None)
                .expect("[ERR] Could not create descriptor pool.")
        };
        self.pool = Some(descriptor_pool);
    }

    pub fn create_set(&mut self) {
        let borrowed_layout = &self.shader.borrow().layout;
        let descriptor_allocate = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool.expect("[ERR] Descriptor pool missing."))
            .set_layouts(borrowed_layout);

        let mut descriptor_set = unsafe {
            self.state
                .device
                .allocate_descriptor_sets(&descriptor_allocate)
                .expect("[ERR] Could not create descriptor set.")
        };

        self.set.append(&mut descriptor_set);
    }

    pub fn get_first_set(&self) -> Option<&vk::DescriptorSet> {
        self.set.first()
    }

    /// Point bindings of the first set at storage buffers, given as
    /// `(binding, buffer, range)` triples.
    pub fn write_storage_buffers(&self, bindings: &[(u32, vk::Buffer, u64)]) {
        let set = *self
            .get_first_set()
            .expect("[ERR] Descriptor set missing.");

        let buffer_nfos: Vec<[vk::DescriptorBufferInfo; 1]> = bindings
            .iter()
            .map(|(_, buffer, range)| {
                [vk::DescriptorBufferInfo::builder()
                    .buffer(*buffer)
                    .offset(0)
                    .range(*range)
                    .build()]
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = bindings
            .iter()
            .zip(buffer_nfos.iter())
            .map(|((binding, _, _), nfo)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(nfo)
                    .build()
            })
            .collect();

        unsafe { self.state.device.update_descriptor_sets(&writes, &[]) };
    }
}

impl Drop for VkDescriptor {
    fn drop(&mut self) {
        unsafe {
            if let Some(pool) = self.pool {
                self.state.device.destroy_descriptor_pool(pool, None);
            }
        }
    }
}
