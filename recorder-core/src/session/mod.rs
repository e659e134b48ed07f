pub mod container_context;
pub mod recorder;
pub mod signal;
pub mod stream_context;
