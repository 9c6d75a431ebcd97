//! Topographic prominence: external sort plus a streaming union-find
//! sweep over a digital elevation model.

pub mod cell;
pub mod chunker;
pub mod config;
pub mod emit;
pub mod log_format;
pub mod sort;
pub mod source;
pub mod sweep;
