pub mod container_sink;
pub mod session_delegate;
