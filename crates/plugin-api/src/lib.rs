#![doc = include_str!("../README.md")]

/// `proto/plugin.proto`에서 생성된 gRPC 메시지와 서비스.
///
/// `tonic-build`의 출력을 커밋해 두었으므로 빌드에 `protoc`이 필요하지
/// 않습니다. 메시지에는 serde derive가 함께 생성되어 있어 같은 타입이
/// 메시지 버스의 JSON 인코딩으로도 사용됩니다.
pub mod plugin;

pub mod handshake;

// --- 주요 타입 re-export ---

pub use handshake::{Handshake, HandshakeError};

pub use plugin::{Empty, ParsedLog, RawLog};

pub use plugin::output_plugin_client::OutputPluginClient;
pub use plugin::parser_plugin_client::ParserPluginClient;
pub use plugin::source_plugin_client::SourcePluginClient;

pub use plugin::parser_plugin_server::{ParserPlugin, ParserPluginServer};
pub use plugin::source_plugin_server::{SourcePlugin, SourcePluginServer};
