//! 메트릭 상수 — 모든 Prometheus 메트릭 이름을 중앙에서 정의합니다.
//!
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//! - 접두어: `kytheron_`
//! - 모듈명: `ingress_`, `processor_`, `sink_`, `registry_`
//! - 접미어: `_total` (counter)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 토픽 레이블 키 (ingest, parsed)
pub const LABEL_TOPIC: &str = "topic";

/// 플러그인 이름 레이블 키
pub const LABEL_PLUGIN: &str = "plugin";

// ─── Ingress 메트릭 ────────────────────────────────────────────────

/// Ingress: 수신한 RawLog 프레임 수 (counter)
pub const INGRESS_LOGS_RECEIVED_TOTAL: &str = "kytheron_ingress_logs_received_total";

// ─── Processor 메트릭 ──────────────────────────────────────────────

/// Processor: ingest 토픽에서 소비한 RawLog 수 (counter)
pub const PROCESSOR_RAW_LOGS_TOTAL: &str = "kytheron_processor_raw_logs_total";

/// Processor: parsed 토픽에 생산한 ParsedLog 수 (counter)
pub const PROCESSOR_PARSED_LOGS_TOTAL: &str = "kytheron_processor_parsed_logs_total";

/// Processor: 처리에 실패한 메시지 수 (counter)
pub const PROCESSOR_ERRORS_TOTAL: &str = "kytheron_processor_errors_total";

// ─── Sink 메트릭 ───────────────────────────────────────────────────

/// Sink: 저장소로 전송한 레코드 수 (counter)
pub const SINK_PUSH_TOTAL: &str = "kytheron_sink_push_total";

/// Sink: 전송 실패로 드롭된 레코드 수 (counter)
pub const SINK_PUSH_FAILED_TOTAL: &str = "kytheron_sink_push_failed_total";

// ─── Registry 메트릭 ───────────────────────────────────────────────

/// Registry: 다운로드한 플러그인 아티팩트 수 (counter)
pub const REGISTRY_DOWNLOADS_TOTAL: &str = "kytheron_registry_downloads_total";
