#![doc = include_str!("../README.md")]

pub mod bank;
pub mod decode;
pub mod encode;
mod guard;
pub mod h264;

pub use bank::{CodecBank, DEFAULT_PARALLEL_CODECS};
pub use h264::H264Codec;
