//! 로그 싱크 — ParsedLog를 Loki push API로 전달합니다.
//!
//! 레코드마다 HTTP POST 한 번을 보내는 at-most-once 싱크입니다. 전송
//! 실패는 호출 쪽에서 로그를 남기고 레코드를 드롭합니다.
//!
//! # 페이로드 형태
//! ```json
//! {"streams":[{"stream":{"source_type":...,"source_name":...},
//!   "values":[["<ns_ts>", "<data>", {"log_id": "<source_id>"}]]}]}
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use kytheron_core::error::PipelineError;
use kytheron_plugin_api::ParsedLog;

/// Loki push API 싱크
#[derive(Debug, Clone)]
pub struct LokiSink {
    client: reqwest::Client,
    push_url: String,
}

impl LokiSink {
    /// Loki 기본 URL로 싱크를 만듭니다.
    pub fn new(loki_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            push_url: format!("{}/api/v1/push", loki_url.trim_end_matches('/')),
        }
    }

    /// push API 전체 URL을 반환합니다.
    pub fn push_url(&self) -> &str {
        &self.push_url
    }

    /// 레코드 하나를 저장소로 전송합니다.
    ///
    /// 타임스탬프는 전송 시점의 벽시계 UTC 나노초입니다. 전송 실패와
    /// 2xx가 아닌 응답은 [`PipelineError::Sink`]로 보고됩니다.
    pub async fn push(&self, log: &ParsedLog) -> Result<(), PipelineError> {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PipelineError::Sink(e.to_string()))?
            .as_nanos();
        let payload = payload(log, timestamp_ns);

        let response = self
            .client
            .post(&self.push_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::Sink(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::Sink(format!(
                "push failed with status: {}",
                response.status()
            )));
        }

        tracing::debug!(
            parsed_log_id = %log.id,
            log_id = %log.source_id,
            "pushed record to storage"
        );
        Ok(())
    }
}

/// 레코드 하나를 단일 스트림/단일 값 튜플의 push 페이로드로 인코딩합니다.
fn payload(log: &ParsedLog, timestamp_ns: u128) -> serde_json::Value {
    serde_json::json!({
        "streams": [{
            "stream": {
                "source_type": log.source_type,
                "source_name": log.source_name,
            },
            "values": [[
                timestamp_ns.to_string(),
                String::from_utf8_lossy(&log.data),
                { "log_id": log.source_id },
            ]],
        }],
    })
}
