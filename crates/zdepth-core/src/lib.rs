#![doc = include_str!("../README.md")]

pub mod codec_traits;
pub mod config;
pub mod context;
pub mod cuda;
pub mod error;
pub mod types;
