pub mod config;
pub mod diagnostics;
pub mod error;
pub mod formats;
pub mod rational;
pub mod recording_result;
pub mod state;
