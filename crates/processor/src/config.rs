//! 프로세서 설정
//!
//! core의 [`KytheronConfig`](kytheron_core::config::KytheronConfig)에서
//! 파이프라인에 필요한 값만 추려 전달합니다.

use kytheron_core::config::KytheronConfig;

/// 컨슈머 그룹 ID 기본값
pub const DEFAULT_GROUP_ID: &str = "kytheron";

/// 스트림 파이프라인 설정
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// ingest 토픽이 있는 source 브로커 주소
    pub source_brokers: String,
    /// parsed 토픽이 있는 parser 브로커 주소
    pub parser_brokers: String,
    /// 두 컨슈머가 공유하는 그룹 ID
    pub group_id: String,
    /// Loki 기본 URL
    pub loki_url: String,
}

impl ProcessorConfig {
    /// core 설정에서 프로세서 설정을 만듭니다.
    pub fn from_core(config: &KytheronConfig) -> Self {
        Self {
            source_brokers: config.kafka.source.url.clone(),
            parser_brokers: config.kafka.parser.url.clone(),
            group_id: DEFAULT_GROUP_ID.to_owned(),
            loki_url: config.loki.url.clone(),
        }
    }
}
