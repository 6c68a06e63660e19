pub mod vkcmd;
pub mod vkdescriptor;
pub mod vkfence;
pub mod vkmem;
pub mod vkpipeline;
pub mod vkshader;
pub mod vkstate;
