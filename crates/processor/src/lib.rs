#![doc = include_str!("../README.md")]

pub mod config;
pub mod processor;
pub mod sink;

// --- 주요 타입 re-export ---

pub use config::ProcessorConfig;
pub use processor::Processor;
pub use sink::LokiSink;
