#![doc = include_str!("../README.md")]

pub mod server;

// --- 주요 타입 re-export ---

pub use server::{serve, serve_with_shutdown, IngressConfig};
