//! 설정 관리 — kytheron.toml 파싱 및 검증
//!
//! 모든 상위 컴포넌트(레지스트리, 프로세서, 인그레스, 데몬)는
//! [`KytheronConfig`]를 통해 설정을 전달받습니다.
//!
//! # 설정 예시
//! ```toml
//! [general]
//! log_level = "info"
//! log_format = "json"
//!
//! [kafka.source]
//! url = "localhost:9092"
//!
//! [kafka.parser]
//! url = "localhost:9093"
//!
//! [server.grpc]
//! port = 50051
//!
//! [registry]
//! cache_dir = "/var/lib/kytheron/plugins"
//!
//! [loki]
//! url = "http://localhost:3100"
//!
//! [policies]
//! url = "os:///etc/kytheron/policies"
//!
//! [[plugins]]
//! type = "parser"
//! name = "cloudtrail"
//! version = "v0.1.0"
//! checksum = "d52eab3db33b5b19a41b42f5b776f2ceebf74981fba8ded9bef2743d75f50471"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 플러그인 아티팩트 릴리스의 기본 URL
pub const DEFAULT_BASE_URL: &str = "https://github.com/kytheron-org";

/// Kytheron 통합 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KytheronConfig {
    /// 일반 설정 (로깅)
    pub general: GeneralConfig,
    /// 메시지 버스 설정 (source/parser 브로커)
    pub kafka: KafkaMap,
    /// 서버 설정
    pub server: ServerConfig,
    /// 플러그인 레지스트리 설정
    pub registry: RegistryConfig,
    /// 장기 저장소 (Loki) 설정
    pub loki: LokiConfig,
    /// 정책 저장소 설정
    pub policies: PoliciesConfig,
    /// 기동 시 로드할 플러그인 목록
    pub plugins: Vec<PluginSpec>,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

/// 단일 Kafka 브로커 엔드포인트
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KafkaEndpoint {
    /// bootstrap.servers 주소
    pub url: String,
}

/// 논리 브로커 맵 — ingest 토픽용 source, parsed 토픽용 parser
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaMap {
    /// ingest 토픽이 있는 브로커
    pub source: KafkaEndpoint,
    /// parsed 토픽이 있는 브로커
    pub parser: KafkaEndpoint,
}

/// 서버 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 인그레스 gRPC 서버 설정
    pub grpc: GrpcServerConfig,
}

/// 인그레스 gRPC 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcServerConfig {
    /// 수신 TCP 포트
    pub port: u16,
    /// 송신 메시지 최대 크기 (바이트)
    pub max_send_message_size: usize,
    /// 수신 메시지 최대 크기 (바이트)
    pub max_recv_message_size: usize,
}

/// 플러그인 레지스트리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 플러그인 릴리스 기본 URL
    pub base_url: String,
    /// 로컬 플러그인 캐시 디렉토리
    pub cache_dir: String,
}

/// 장기 저장소 (Loki) 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LokiConfig {
    /// Loki push API 기본 URL (예: "http://localhost:3100")
    pub url: String,
}

/// 정책 저장소 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliciesConfig {
    /// 스킴 접두사가 붙은 정책 저장소 URL (현재 `os://<path>`만 지원)
    pub url: String,
}

/// 기동 시 로드할 플러그인 선언
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSpec {
    /// 플러그인 유형 (parser, output, source)
    #[serde(rename = "type")]
    pub plugin_type: String,
    /// 플러그인 이름 (예: "cloudtrail")
    pub name: String,
    /// 플러그인 버전 (릴리스 태그)
    pub version: String,
    /// 호스트 플랫폼 바이너리의 SHA-256 체크섬 (64자리 hex)
    pub checksum: String,
}

impl Default for KytheronConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            kafka: KafkaMap::default(),
            server: ServerConfig::default(),
            registry: RegistryConfig::default(),
            loki: LokiConfig::default(),
            policies: PoliciesConfig::default(),
            plugins: Vec::new(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            port: 50051,
            max_send_message_size: 4 * 1024 * 1024,
            max_recv_message_size: 4 * 1024 * 1024,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            cache_dir: "/var/lib/kytheron/plugins".to_owned(),
        }
    }
}

impl KytheronConfig {
    /// 설정 파일을 읽고 파싱한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|_| ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.source.url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "kafka.source.url".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.kafka.parser.url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "kafka.parser.url".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.server.grpc.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.grpc.port".to_owned(),
                reason: "must not be 0".to_owned(),
            });
        }
        if self.registry.cache_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "registry.cache_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if !self.loki.url.starts_with("http://") && !self.loki.url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "loki.url".to_owned(),
                reason: "must be an http(s) URL".to_owned(),
            });
        }

        for plugin in &self.plugins {
            if plugin.name.is_empty() || plugin.version.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "plugins".to_owned(),
                    reason: "plugin name and version must not be empty".to_owned(),
                });
            }
            if plugin.checksum.len() != 64
                || !plugin.checksum.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(ConfigError::InvalidValue {
                    field: "plugins".to_owned(),
                    reason: format!(
                        "plugin '{}' checksum must be a 64-character SHA-256 hex string",
                        plugin.name
                    ),
                });
            }
        }

        Ok(())
    }

    /// 정책 저장소 URL을 로컬 파일시스템 루트로 변환합니다.
    ///
    /// 현재는 `os://<path>` 스킴만 지원하며, 다른 스킴은
    /// `ConfigError::InvalidValue`를 반환합니다.
    pub fn policy_root(&self) -> Result<PathBuf, ConfigError> {
        match self.policies.url.split_once("://") {
            Some(("os", path)) if !path.is_empty() => Ok(PathBuf::from(path)),
            Some((scheme, _)) => Err(ConfigError::InvalidValue {
                field: "policies.url".to_owned(),
                reason: format!("unsupported storage scheme: {scheme}"),
            }),
            None => Err(ConfigError::InvalidValue {
                field: "policies.url".to_owned(),
                reason: "missing storage scheme (expected os://<path>)".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> KytheronConfig {
        KytheronConfig {
            kafka: KafkaMap {
                source: KafkaEndpoint {
                    url: "localhost:9092".to_owned(),
                },
                parser: KafkaEndpoint {
                    url: "localhost:9093".to_owned(),
                },
            },
            loki: LokiConfig {
                url: "http://localhost:3100".to_owned(),
            },
            policies: PoliciesConfig {
                url: "os:///etc/kytheron/policies".to_owned(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn validate_rejects_empty_kafka_url() {
        let mut config = valid_config();
        config.kafka.source.url.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("kafka.source.url"));
    }

    #[test]
    fn validate_rejects_zero_port() {
        let mut config = valid_config();
        config.server.grpc.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_loki_url() {
        let mut config = valid_config();
        config.loki.url = "localhost:3100".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("loki.url"));
    }

    #[test]
    fn validate_rejects_malformed_checksum() {
        let mut config = valid_config();
        config.plugins.push(PluginSpec {
            plugin_type: "parser".to_owned(),
            name: "cloudtrail".to_owned(),
            version: "v0.1.0".to_owned(),
            checksum: "deadbeef".to_owned(),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn policy_root_parses_os_scheme() {
        let config = valid_config();
        let root = config.policy_root().unwrap();
        assert_eq!(root, PathBuf::from("/etc/kytheron/policies"));
    }

    #[test]
    fn policy_root_rejects_unknown_scheme() {
        let mut config = valid_config();
        config.policies.url = "s3://bucket/policies".to_owned();
        let err = config.policy_root().unwrap_err();
        assert!(err.to_string().contains("unsupported storage scheme"));
    }

    #[test]
    fn policy_root_rejects_missing_scheme() {
        let mut config = valid_config();
        config.policies.url = "/etc/kytheron/policies".to_owned();
        assert!(config.policy_root().is_err());
    }

    #[test]
    fn config_parses_from_toml() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [kafka.source]
            url = "broker-a:9092"

            [kafka.parser]
            url = "broker-b:9092"

            [server.grpc]
            port = 9000
            max_recv_message_size = 8388608

            [loki]
            url = "http://loki:3100"

            [policies]
            url = "os:///tmp/policies"

            [[plugins]]
            type = "parser"
            name = "cloudtrail"
            version = "v0.1.0"
            checksum = "d52eab3db33b5b19a41b42f5b776f2ceebf74981fba8ded9bef2743d75f50471"
        "#;

        let config: KytheronConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();

        assert_eq!(config.general.log_level, "debug");
        // 지정하지 않은 필드는 기본값
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.kafka.source.url, "broker-a:9092");
        assert_eq!(config.server.grpc.port, 9000);
        assert_eq!(config.server.grpc.max_recv_message_size, 8 * 1024 * 1024);
        assert_eq!(config.plugins.len(), 1);
        assert_eq!(config.plugins[0].plugin_type, "parser");
        assert_eq!(config.plugins[0].name, "cloudtrail");
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        let path = std::env::temp_dir().join(format!(
            "kytheron_test_missing_{}.toml",
            std::process::id()
        ));
        let err = KytheronConfig::load(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
