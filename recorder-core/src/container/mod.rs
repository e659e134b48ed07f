//! Container muxing: the Matroska writer, the packet interleaver that feeds
//! it, and a reader that summarizes finished files.

pub mod ebml;
pub mod format;
pub mod interleave;
pub mod matroska;
pub mod probe;
