#![doc = include_str!("../README.md")]

pub mod backend;
pub mod nvdec_stub;
pub mod nvenc_stub;

pub use backend::NvidiaBackend;
