pub mod barrier;
pub mod blit;
pub mod pass;
pub mod submit_info;
