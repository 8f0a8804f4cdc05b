//! 에러 타입 — 도메인별 에러 정의
//!
//! 기동 단계의 에러(설정, 정책, 플러그인 로드)는 상위에서 프로세스를
//! 종료시키고, 런타임 파이프라인 에러는 warn 로그 후 루프를 계속합니다.

/// Kytheron 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum KytheronError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 정책 문서 디코딩 에러
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// 플러그인 레지스트리 에러
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// 스트림 파이프라인 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 정책 문서 에러
///
/// 정책 디코딩은 항상 원본 파일명을 포함하여 실패를 보고합니다.
/// 부분적으로 디코딩된 정책은 절대 반환되지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// 어휘/구문 에러
    #[error("policy parse error in {file}: {reason}")]
    Parse { file: String, reason: String },

    /// 블록 구조 디코딩 실패 (라벨 수, 속성 타입 등)
    #[error("policy decode error in {file}: {reason}")]
    Decode { file: String, reason: String },

    /// 선언되지 않은 블록에 대한 심볼 참조
    #[error("unresolved reference in {file}: {reference}")]
    UnresolvedReference { file: String, reference: String },

    /// 같은 블록 종류 안에서 (type, name) 중복
    #[error("duplicate {kind} block in {file}: {block_type}.{name}")]
    DuplicateBlock {
        file: String,
        kind: String,
        block_type: String,
        name: String,
    },
}

/// 플러그인 레지스트리 에러
///
/// `load` 중의 모든 실패는 레지스트리에 부분 항목을 남기지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// 현재 OS/아키텍처용 바이너리가 매니페스트에 없음
    #[error("plugin '{name}' has no binary for platform {platform}")]
    UnsupportedPlatform { name: String, platform: String },

    /// 아티팩트 다운로드 실패 (네트워크, HTTP 상태)
    #[error("failed to download plugin '{name}': {reason}")]
    Download { name: String, reason: String },

    /// SHA-256 체크섬 불일치
    #[error("checksum mismatch for plugin '{name}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// 자식 프로세스 시작 실패
    #[error("failed to start plugin '{name}': {reason}")]
    Spawn { name: String, reason: String },

    /// 핸드셰이크 타임아웃 또는 형식 오류
    #[error("plugin '{name}' handshake failed: {reason}")]
    Handshake { name: String, reason: String },

    /// RPC 채널 연결 실패
    #[error("failed to dial plugin '{name}': {reason}")]
    Dial { name: String, reason: String },

    /// 등록되지 않은 플러그인 조회
    #[error("unknown plugin: {name}")]
    Unknown { name: String },
}

/// 스트림 파이프라인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 버스 메시지 읽기 실패 (타임아웃 제외)
    #[error("bus read error: {0}")]
    BusRead(String),

    /// 버스 메시지 생산 실패
    #[error("bus produce error: {0}")]
    BusProduce(String),

    /// 파서 스트리밍 RPC 에러
    #[error("rpc stream error: {0}")]
    RpcStream(String),

    /// 저장소 싱크 HTTP 에러
    #[error("sink error: {0}")]
    Sink(String),

    /// 태스크 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 메시지 직렬화/역직렬화 실패
    #[error("serialize error: {0}")]
    Serialize(String),
}
