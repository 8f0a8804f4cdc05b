#![doc = include_str!("../README.md")]

pub mod fetch;
pub mod manifest;
pub mod process;
pub mod registry;

// --- 주요 타입 re-export ---

pub use manifest::{host_platform, Binary, PluginManifest};
pub use process::PluginProcess;
pub use registry::{OutputClient, ParserClient, PluginRegistry};
