use crate::low::{vkcmd, vkdescriptor, vkfence, vkmem, vkpipeline, vkshader, vkstate};
use crate::utils::get_fract_s;
pub use ash::version::DeviceV1_0;
use ash::vk;
use std::cell::RefCell;
use std::ffi::CString;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use std::time::Instant;

/// Elements processed per workgroup. Must match the `local_size_x` declared
/// in both kernels.
pub const SHADER_LOCAL_SIZE: u32 = 64;

/// Tolerance used when checking the device results against the host.
pub const TOLERANCE: f32 = 1e-6;

const BIND_INPUT_A: u32 = 0;
const BIND_INPUT_B: u32 = 1;
const BIND_OUTPUT: u32 = 2;

pub struct JobTimings {
    pub upload: Duration,
    pub pipelines: Duration,
    pub record: Duration,
    pub execution: Duration,
    pub download: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct JobTimingsBuilder {
    upload_timer: Option<Instant>,
    upload: Option<Duration>,
    pipelines_timer: Option<Instant>,
    pipelines: Option<Duration>,
    record_timer: Option<Instant>,
    record: Option<Duration>,
    execution_timer: Option<Instant>,
    execution: Option<Duration>,
    download_timer: Option<Instant>,
    download: Option<Duration>,
}

impl JobTimingsBuilder {
    pub fn new() -> JobTimingsBuilder {
        JobTimingsBuilder {
            upload_timer: None,
            upload: None,
            pipelines_timer: None,
            pipelines: None,
            record_timer: None,
            record: None,
            execution_timer: None,
            execution: None,
            download_timer: None,
            download: None,
        }
    }

    pub fn start_upload(mut self) -> JobTimingsBuilder {
        self.upload_timer = Some(Instant::now());
        self
    }

    pub fn stop_upload(mut self) -> JobTimingsBuilder {
        self.upload = self.upload_timer.map(|instant| instant.elapsed());
        self
    }

    pub fn start_pipelines(mut self) -> JobTimingsBuilder {
        self.pipelines_timer = Some(Instant::now());
        self
    }

    pub fn stop_pipelines(mut self) -> JobTimingsBuilder {
        self.pipelines = self.pipelines_timer.map(|instant| instant.elapsed());
        self
    }

    pub fn start_record(mut self) -> JobTimingsBuilder {
        self.record_timer = Some(Instant::now());
        self
    }

    pub fn stop_record(mut self) -> JobTimingsBuilder {
        self.record = self.record_timer.map(|instant| instant.elapsed());
        self
    }

    pub fn start_execution(mut self) -> JobTimingsBuilder {
        self.execution_timer = Some(Instant::now());
        self
    }

    pub fn stop_execution(mut self) -> JobTimingsBuilder {
        self.execution = self.execution_timer.map(|instant| instant.elapsed());
        self
    }

    pub fn start_download(mut self) -> JobTimingsBuilder {
        self.download_timer = Some(Instant::now());
        self
    }

    pub fn stop_download(mut self) -> JobTimingsBuilder {
        self.download = self.download_timer.map(|instant| instant.elapsed());
        self
    }

    pub fn build(self) -> JobTimings {
        JobTimings {
            upload: self.upload.unwrap_or_default(),
            pipelines: self.pipelines.unwrap_or_default(),
            record: self.record.unwrap_or_default(),
            execution: self.execution.unwrap_or_default(),
            download: self.download.unwrap_or_default(),
        }
    }
}

impl fmt::Display for JobTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "upload: {}ms", get_fract_s(self.upload))?;
        writeln!(f, "pipelines: {}ms", get_fract_s(self.pipelines))?;
        writeln!(f, "record: {}ms", get_fract_s(self.record))?;
        writeln!(f, "execution: {}ms", get_fract_s(self.execution))?;
        writeln!(f, "download: {}ms", get_fract_s(self.download))?;
        write!(
            f,
            "total: {}ms",
            get_fract_s(
                self.upload + self.pipelines + self.record + self.execution + self.download
            )
        )
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum JobStatus {
    Init,
    Executing,
    Success,
    Failure,
}

/// Workgroup count covering `len` elements with workgroups of `local_size`.
pub fn dispatch_groups(len: usize, local_size: u32) -> (u32, u32, u32) {
    let groups = (len as u32 + local_size - 1) / local_size;
    (groups.max(1), 1, 1)
}

/// Check both identities on the host. Returns the indices where the device
/// results differ from the host arithmetic by more than [`TOLERANCE`].
pub fn verify_results(a: &[f32], b: &[f32], product: &[f32], sum: &[f32]) -> Vec<usize> {
    assert!(
        a.len() == b.len() && a.len() == product.len() && a.len() == sum.len(),
        "all four arrays must have the same length"
    );
    let mut mismatches = Vec::new();
    for i in 0..a.len() {
        if (a[i] * b[i] - product[i]).abs() > TOLERANCE || (a[i] + b[i] - sum[i]).abs() > TOLERANCE
        {
            mismatches.push(i);
        }
    }
    mismatches
}

/// Everything needed to dispatch one kernel: its pipeline and the
/// descriptor set pointing at the two inputs plus that kernel's output.
struct KernelState {
    pipeline: vkpipeline::VkComputePipeline,
    layout: vk::PipelineLayout,
    descriptor: vkdescriptor::VkDescriptor,
}

/// The four equally sized demo buffers: two inputs, one output per kernel.
struct DeviceBuffers {
    a: vkmem::VkBuffer,
    b: vkmem::VkBuffer,
    product: vkmem::VkBuffer,
    sum: vkmem::VkBuffer,
}

impl DeviceBuffers {
    fn all(&self) -> [&vkmem::VkBuffer; 4] {
        [&self.a, &self.b, &self.product, &self.sum]
    }
}

/// Results read back from the device.
pub struct JobOutput {
    pub product: Vec<f32>,
    pub sum: Vec<f32>,
}

/// A single compute job running the multiply and add kernels over two input
/// arrays. Both dispatches are recorded into one command buffer, submitted
/// once, and awaited through one fence.
pub struct MulAddJob<'a> {
    a: &'a [f32],
    b: &'a [f32],
    multiply_shader: PathBuf,
    add_shader: PathBuf,
    dispatch: (u32, u32, u32),
    state: JobState,
}

// Field order matters for teardown: the fence and command pool go before
// the kernels, the kernels before the buffers, the buffers before the
// memory backing them.
struct JobState {
    timing: JobTimingsBuilder,
    fence: Option<vkfence::VkFence>,
    cmd_pool: Option<vkcmd::VkCmdPool>,
    kernels: Vec<KernelState>,
    buffers: Option<DeviceBuffers>,
    memory: Option<vkmem::VkMem>,
    vulkan: Rc<vkstate::VulkanState>,
}

impl<'a> MulAddJob<'a> {
    pub fn new(
        vulkan: Rc<vkstate::VulkanState>,
        a: &'a [f32],
        b: &'a [f32],
        multiply_shader: PathBuf,
        add_shader: PathBuf,
    ) -> MulAddJob<'a> {
        assert_eq!(a.len(), b.len(), "input arrays must have the same length");
        MulAddJob {
            a,
            b,
            multiply_shader,
            add_shader,
            dispatch: dispatch_groups(a.len(), SHADER_LOCAL_SIZE),
            state: JobState {
                timing: JobTimingsBuilder::new(),
                fence: None,
                cmd_pool: None,
                kernels: Vec::new(),
                buffers: None,
                memory: None,
                vulkan,
            },
        }
    }

    /// Create the four buffers, back them with one host-visible allocation
    /// and copy both inputs in.
    pub fn upload_buffers(&mut self) {
        self.state.timing = self.state.timing.start_upload();
        let byte_size = (self.a.len() * std::mem::size_of::<f32>()) as u64;

        let mut buffers = DeviceBuffers {
            a: vkmem::VkBuffer::new(
                self.state.vulkan.clone(),
                byte_size,
                vk::BufferUsageFlags::STORAGE_BUFFER,
            ),
            b: vkmem::VkBuffer::new(
                self.state.vulkan.clone(),
                byte_size,
                vk::BufferUsageFlags::STORAGE_BUFFER,
            ),
            product: vkmem::VkBuffer::new(
                self.state.vulkan.clone(),
                byte_size,
                vk::BufferUsageFlags::STORAGE_BUFFER,
            ),
            sum: vkmem::VkBuffer::new(
                self.state.vulkan.clone(),
                byte_size,
                vk::BufferUsageFlags::STORAGE_BUFFER,
            ),
        };

        let (mem_size, offsets) = vkmem::compute_non_overlapping_buffer_alignment(&buffers.all());
        let type_mask = vkmem::shared_memory_type_mask(&buffers.all());
        let memory = vkmem::VkMem::find_mem(self.state.vulkan.clone(), mem_size, type_mask)
            .expect("[ERR] Could not find a memory type fitting our need.");

        buffers.a.bind(memory.mem, offsets[0]);
        buffers.b.bind(memory.mem, offsets[1]);
        buffers.product.bind(memory.mem, offsets[2]);
        buffers.sum.bind(memory.mem, offsets[3]);

        memory.map_buffer(self.a, &buffers.a);
        memory.map_buffer(self.b, &buffers.b);

        self.state.memory = Some(memory);
        self.state.buffers = Some(buffers);
        self.state.timing = self.state.timing.stop_upload();
    }

    /// Load both kernels and build a pipeline and descriptor set for each.
    /// Each kernel sees the inputs at bindings 0 and 1 and its own output
    /// at binding 2.
    pub fn build_kernels(&mut self) {
        self.state.timing = self.state.timing.start_pipelines();
        let buffers = self
            .state
            .buffers
            .as_ref()
            .expect("[ERR] Buffers must be uploaded before building kernels.");

        let kernel_sources = [
            (&self.multiply_shader, &buffers.product),
            (&self.add_shader, &buffers.sum),
        ];

        for &(path, output) in kernel_sources.iter() {
            let shader = Rc::new(RefCell::new(vkshader::VkShader::new(
                self.state.vulkan.clone(),
                path,
                CString::new("main").unwrap(),
            )));

            for bind in &[BIND_INPUT_A, BIND_INPUT_B, BIND_OUTPUT] {
                shader.borrow_mut().add_layout_binding(
                    *bind,
                    1,
                    vk::DescriptorType::STORAGE_BUFFER,
                    vk::ShaderStageFlags::COMPUTE,
                );
            }
            shader.borrow_mut().create_pipeline_layout();
            let layout = shader
                .borrow()
                .pipeline
                .expect("[ERR] Shader is missing its pipeline layout.");
            let pipeline =
                vkpipeline::VkComputePipeline::new(self.state.vulkan.clone(), &shader.borrow());

            let mut descriptor =
                vkdescriptor::VkDescriptor::new(self.state.vulkan.clone(), shader.clone());
            descriptor.add_pool_size(3, vk::DescriptorType::STORAGE_BUFFER);
            descriptor.create_pool(1);
            descriptor.create_set();

            descriptor.write_storage_buffers(&[
                (BIND_INPUT_A, buffers.a.buffer, buffers.a.size),
                (BIND_INPUT_B, buffers.b.buffer, buffers.b.size),
                (BIND_OUTPUT, output.buffer, output.size),
            ]);

            self.state.kernels.push(KernelState {
                pipeline,
                layout,
                descriptor,
            });
        }
        self.state.timing = self.state.timing.stop_pipelines();
    }

    /// Record one command buffer holding both dispatches and submit it.
    /// The kernels write disjoint buffers, so no barrier separates them.
    pub fn execute(&mut self) {
        self.state.timing = self.state.timing.start_record();
        let mut cmd_pool = vkcmd::VkCmdPool::new(self.state.vulkan.clone());
        let cmd = cmd_pool.create_cmd_buffer(vk::CommandBufferLevel::PRIMARY);
        cmd_pool.begin_cmd(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, cmd);

        for kernel in &self.state.kernels {
            cmd_pool.bind_compute(
                kernel.pipeline.pipeline,
                kernel.layout,
                &kernel.descriptor.set,
                cmd,
            );
            let (x, y, z) = self.dispatch;
            cmd_pool.dispatch(x, y, z, cmd);
        }
        cmd_pool.end_cmd(cmd);
        self.state.timing = self.state.timing.stop_record();

        let fence = vkfence::VkFence::new(self.state.vulkan.clone(), false);
        self.state.timing = self.state.timing.start_execution();
        let queue = unsafe {
            self.state
                .vulkan
                .device
                .get_device_queue(self.state.vulkan.queue_family_index, 0)
        };
        cmd_pool.submit(queue, Some(fence.fence));
        self.state.fence = Some(fence);
        self.state.cmd_pool = Some(cmd_pool);
    }

    pub fn status(&self) -> JobStatus {
        match &self.state.fence {
            None => JobStatus::Init,
            Some(fence) => match fence.status() {
                vkfence::FenceStates::SIGNALED => JobStatus::Success,
                vkfence::FenceStates::UNSIGNALED => JobStatus::Executing,
                _ => JobStatus::Failure,
            },
        }
    }

    /// Block until the device signals the fence or `timeout` (nanoseconds)
    /// expires.
    pub fn wait_until_idle(&mut self, timeout: u64) -> JobStatus {
        let current_status = self.status();
        if current_status != JobStatus::Executing {
            return current_status;
        }

        if let Some(fence) = &self.state.fence {
            fence.wait(timeout);
        }
        let status = self.status();
        if status == JobStatus::Success {
            self.state.timing = self.state.timing.stop_execution();
        }
        status
    }

    /// Read both result buffers back, once the job succeeded.
    pub fn get_output(&mut self) -> Option<JobOutput> {
        if self.status() != JobStatus::Success {
            return None;
        }

        self.state.timing = self.state.timing.start_download();
        let memory = self.state.memory.as_ref()?;
        let buffers = self.state.buffers.as_ref()?;
        let product = memory.get_buffer::<f32>(&buffers.product);
        let sum = memory.get_buffer::<f32>(&buffers.sum);
        self.state.timing = self.state.timing.stop_download();

        Some(JobOutput { product, sum })
    }

    pub fn get_timing(&self) -> JobTimings {
        self.state.timing.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_groups_covers_every_element() {
        assert_eq!(dispatch_groups(64, 64), (1, 1, 1));
        assert_eq!(dispatch_groups(65, 64), (2, 1, 1));
        assert_eq!(dispatch_groups(128, 64), (2, 1, 1));
        assert_eq!(dispatch_groups(1, 64), (1, 1, 1));
        assert_eq!(dispatch_groups(100_000_000, 64), (1_562_500, 1, 1));
    }

    #[test]
    fn verify_accepts_host_computed_results() {
        let a = crate::utils::rand_vec::<f32>(256, 0.0, 1.0);
        let b = crate::utils::rand_vec::<f32>(256, 0.0, 1.0);
        let product: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x * y).collect();
        let sum: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
        assert!(verify_results(&a, &b, &product, &sum).is_empty());
    }

    #[test]
    fn verify_matches_the_expected_values() {
        let a = [0.1f32, 0.2, 0.3, 0.4];
        let b = [0.5f32, 0.6, 0.7, 0.8];
        let product = [0.05f32, 0.12, 0.21, 0.32];
        let sum = [0.6f32, 0.8, 1.0, 1.2];
        assert!(verify_results(&a, &b, &product, &sum).is_empty());
    }

    #[test]
    fn verify_flags_wrong_entries() {
        let a = [0.1f32, 0.2];
        let b = [0.5f32, 0.6];
        let product = [0.05f32, 0.5];
        let sum = [0.6f32, 0.8];
        assert_eq!(verify_results(&a, &b, &product, &sum), vec![1]);
    }

    #[test]
    fn verify_tolerates_float_noise() {
        let a = [0.25f32];
        let b = [0.5f32];
        let product = [0.125f32 + 5.0e-7];
        let sum = [0.75f32 - 5.0e-7];
        assert!(verify_results(&a, &b, &product, &sum).is_empty());
    }

    #[test]
    fn timings_display_reports_all_phases() {
        let timings = JobTimingsBuilder::new()
            .start_upload()
            .stop_upload()
            .build();
        let rendered = format!("{}", timings);
        assert!(rendered.contains("upload:"));
        assert!(rendered.contains("execution:"));
        assert!(rendered.contains("total:"));
    }
}
