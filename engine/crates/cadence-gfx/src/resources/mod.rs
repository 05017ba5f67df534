pub mod image;
pub mod sampler;
