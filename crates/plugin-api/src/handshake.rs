//! 플러그인 핸드셰이크 — 자식 프로세스가 stdout으로 RPC 주소를 알리는 프로토콜
//!
//! 플러그인 자식 프로세스는 기동 직후 stdout에 JSON 한 줄을 출력합니다:
//!
//! ```text
//! {"type":"handshake","addr":"/tmp/plugin.sock"}
//! ```
//!
//! 이 줄 앞에는 다른 바이트가 와서는 안 되며, `addr`는 RPC 채널을 연결할
//! Unix 도메인 소켓 경로로 해석됩니다. 부모(레지스트리)는 이 줄을 읽고,
//! 인그레스 서버는 자신도 플러그인으로 기동될 수 있도록 같은 줄을 출력합니다.

use serde::{Deserialize, Serialize};

/// 핸드셰이크 메시지의 `type` 필드 값
const HANDSHAKE_TYPE: &str = "handshake";

/// 핸드셰이크 파싱 실패
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// JSON이 아니거나 필드가 누락됨
    #[error("malformed handshake: {0}")]
    Malformed(String),

    /// `type` 필드가 "handshake"가 아님
    #[error("unexpected handshake type: {0}")]
    UnexpectedType(String),

    /// `addr` 필드가 비어 있음
    #[error("handshake address is empty")]
    EmptyAddr,
}

/// stdout 한 줄 핸드셰이크 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// 메시지 타입 (항상 "handshake")
    #[serde(rename = "type")]
    pub message_type: String,
    /// RPC 수신 주소 (Unix 도메인 소켓 경로)
    pub addr: String,
}

impl Handshake {
    /// 주어진 주소에 대한 핸드셰이크 메시지를 생성합니다.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            message_type: HANDSHAKE_TYPE.to_owned(),
            addr: addr.into(),
        }
    }

    /// stdout에 출력할 한 줄 (개행 포함)을 만듭니다.
    pub fn to_line(&self) -> String {
        // Handshake 직렬화는 실패할 수 없는 형태의 구조체이므로 표현만 조립한다.
        format!(
            "{}\n",
            serde_json::json!({ "type": self.message_type, "addr": self.addr })
        )
    }

    /// 자식 stdout에서 읽은 한 줄을 파싱합니다.
    ///
    /// `type` 필드가 "handshake"가 아니거나 `addr`가 비어 있으면 실패합니다.
    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let handshake: Self = serde_json::from_str(line.trim())
            .map_err(|e| HandshakeError::Malformed(e.to_string()))?;

        if handshake.message_type != HANDSHAKE_TYPE {
            return Err(HandshakeError::UnexpectedType(handshake.message_type));
        }
        if handshake.addr.is_empty() {
            return Err(HandshakeError::EmptyAddr);
        }
        Ok(handshake)
    }
}
