use muladd::high::job::{verify_results, JobStatus, MulAddJob};
use muladd::low::vkstate;
use muladd::utils;

use std::path::PathBuf;
use std::process;
use std::rc::Rc;

/// Number of floats in each of the four demo buffers.
const ARRAY_LEN: usize = 64;

const MULTIPLY_SHADER: &str = "shaders/bin/multiply.cs.spirv";
const ADD_SHADER: &str = "shaders/bin/add.cs.spirv";

fn main() {
    env_logger::init();

    let vulkan = Rc::new(vkstate::init_vulkan());
    println!("[NFO] Vulkan initialized.");
    vkstate::print_work_limits(&vulkan);

    // Two random input arrays in [0, 1).
    let a = utils::rand_vec::<f32>(ARRAY_LEN, 0.0, 1.0);
    let b = utils::rand_vec::<f32>(ARRAY_LEN, 0.0, 1.0);

    let mut job = MulAddJob::new(
        vulkan,
        &a,
        &b,
        PathBuf::from(MULTIPLY_SHADER),
        PathBuf::from(ADD_SHADER),
    );

    job.upload_buffers();
    job.build_kernels();
    job.execute();

    while job.status() == JobStatus::Executing {
        job.wait_until_idle(1_000_000_000);
    }
    if job.status() != JobStatus::Success {
        eprintln!("[ERR] The compute job did not complete.");
        process::exit(1);
    }

    let output = job
        .get_output()
        .expect("[ERR] Could not read the results back.");

    for i in 0..ARRAY_LEN {
        println!("{}:{}+{}={}", i, a[i], b[i], output.sum[i]);
        println!("  :{}*{}={}", a[i], b[i], output.product[i]);
    }

    let mismatches = verify_results(&a, &b, &output.product, &output.sum);
    if !mismatches.is_empty() {
        for i in mismatches.iter().take(5) {
            eprintln!(
                "DIFF[{}]: {} * {} = {} // {} + {} = {}",
                i, a[*i], b[*i], output.product[*i], a[*i], b[*i], output.sum[*i]
            );
        }
        eprintln!(
            "[ERR] {} results differ from the host computation.",
            mismatches.len()
        );
        process::exit(1);
    }
    println!("Compute results as expected.");

    println!("Timings:\n{}", job.get_timing());
    println!("Computation complete.");
}
