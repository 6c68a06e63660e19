//! A small Vulkan compute demo: two elementwise kernels (multiply and add)
//! run over a pair of random float arrays in a single command buffer, the
//! host blocks until the device is done, then reads both results back from
//! shared memory and checks them.
//!
//! The `low` module wraps the individual Vulkan objects, `high` drives one
//! complete job, `utils` holds the small helpers shared by both.

extern crate ash;

pub mod high;
pub mod low;
pub mod utils;
