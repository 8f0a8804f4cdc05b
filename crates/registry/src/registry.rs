//! 플러그인 레지스트리 — capability별 RPC 클라이언트 테이블과 프로세스 추적
//!
//! # 잠금 규율
//!
//! 모든 테이블(generic 채널, 파서, 출력, 프로세스)은 하나의 RwLock이
//! 보호합니다. `load`는 빠른 존재 확인에만 읽기 잠금을 잡고, 네트워크와
//! 프로세스 I/O는 잠금 없이 수행한 뒤, 클라이언트 핸들 게시에만 쓰기
//! 잠금을 잡습니다. 같은 이름에 대한 동시 `load`는 둘 다 작업을 수행할
//! 수 있으며 나중에 끝난 쪽이 덮어씁니다 — 연산이 멱등이고 두 클라이언트가
//! 같은 바이너리를 가리키므로 계약은 유지됩니다. 이때 교체된 자식
//! 프로세스는 이름당 프로세스 하나의 불변식을 위해 종료시킵니다.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::net::UnixStream;
use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use kytheron_core::config::RegistryConfig;
use kytheron_core::error::PluginError;
use kytheron_plugin_api::{OutputPluginClient, ParserPluginClient};

use crate::fetch;
use crate::manifest::PluginManifest;
use crate::process::{self, PluginProcess};

/// Channel 위에 고정된 파서 클라이언트
pub type ParserClient = ParserPluginClient<Channel>;
/// Channel 위에 고정된 출력 클라이언트
pub type OutputClient = OutputPluginClient<Channel>;

/// 하나의 RwLock이 보호하는 capability 테이블들
#[derive(Default)]
struct Tables {
    /// generic capability — 원시 RPC 채널
    channels: HashMap<String, Channel>,
    /// 파서 capability
    parsers: HashMap<String, ParserClient>,
    /// 출력 capability
    outputs: HashMap<String, OutputClient>,
    /// 추적 중인 자식 프로세스
    processes: HashMap<String, PluginProcess>,
}

/// 플러그인 레지스트리
///
/// (name, version)을 로컬 실행 파일로 해석하고, 없으면 다운로드/검증하고,
/// 자식 프로세스로 기동하여 핸드셰이크로 알린 주소에 RPC 채널을 연결한 뒤
/// 타입이 지정된 클라이언트로 보관합니다.
pub struct PluginRegistry {
    base_url: String,
    cache_dir: PathBuf,
    http: reqwest::Client,
    tables: RwLock<Tables>,
}

impl PluginRegistry {
    /// 설정으로 빈 레지스트리를 생성합니다.
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            cache_dir: PathBuf::from(&config.cache_dir),
            http: reqwest::Client::new(),
            tables: RwLock::new(Tables::default()),
        }
    }

    /// 플러그인을 로드합니다. 멱등 연산입니다.
    ///
    /// 이름에 대한 라이브 클라이언트가 이미 있으면 즉시 성공을 반환합니다.
    /// 그렇지 않으면 매니페스트 해석 → 캐시 확인/다운로드/검증 → 프로세스
    /// 기동 → 핸드셰이크 → RPC 연결 → 테이블 게시 순으로 진행하며, 기동
    /// 이후의 실패는 자식을 종료시키고 레지스트리에 아무 항목도 남기지
    /// 않습니다.
    pub async fn load(&self, name: &str, version: &str, checksum: &str) -> Result<(), PluginError> {
        {
            let tables = self.tables.read().await;
            if tables.channels.contains_key(name) {
                tracing::debug!(plugin = %name, "plugin already loaded");
                return Ok(());
            }
        }

        let manifest = PluginManifest::for_release(&self.base_url, name, version, checksum);
        let binary_path = fetch::ensure_cached(&self.http, &manifest, &self.cache_dir).await?;

        let (mut process, addr) = process::spawn(name, &binary_path).await?;

        let channel = match dial_unix(&addr).await {
            Ok(channel) => channel,
            Err(e) => {
                process.kill();
                return Err(PluginError::Dial {
                    name: name.to_owned(),
                    reason: e.to_string(),
                });
            }
        };

        let mut tables = self.tables.write().await;
        tables.channels.insert(name.to_owned(), channel.clone());
        tables
            .parsers
            .insert(name.to_owned(), ParserPluginClient::new(channel.clone()));
        tables
            .outputs
            .insert(name.to_owned(), OutputPluginClient::new(channel));
        if let Some(mut replaced) = tables.processes.insert(name.to_owned(), process) {
            // 동시 load 경합에서 진 쪽의 자식은 종료시킨다
            tracing::warn!(plugin = %name, "replacing plugin process from concurrent load");
            replaced.kill();
        }

        tracing::info!(plugin = %name, version = %version, "plugin loaded");
        Ok(())
    }

    /// 파서 클라이언트를 조회합니다.
    pub async fn parser(&self, name: &str) -> Result<ParserClient, PluginError> {
        let tables = self.tables.read().await;
        tables
            .parsers
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::Unknown {
                name: name.to_owned(),
            })
    }

    /// 출력 클라이언트를 조회합니다.
    pub async fn output(&self, name: &str) -> Result<OutputClient, PluginError> {
        let tables = self.tables.read().await;
        tables
            .outputs
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::Unknown {
                name: name.to_owned(),
            })
    }

    /// 이름의 플러그인이 로드되어 있는지 확인합니다.
    pub async fn contains(&self, name: &str) -> bool {
        self.tables.read().await.channels.contains_key(name)
    }

    /// 로드된 플러그인 수를 반환합니다.
    pub async fn len(&self) -> usize {
        self.tables.read().await.channels.len()
    }

    /// 레지스트리가 비었는지 확인합니다.
    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.channels.is_empty()
    }

    /// 추적 중인 모든 자식 프로세스를 종료시키고 테이블을 비웁니다.
    ///
    /// Best-effort이며 종료 실패를 드러내지 않습니다.
    pub async fn shutdown(&self) {
        let mut tables = self.tables.write().await;
        for (name, process) in tables.processes.iter_mut() {
            tracing::info!(plugin = %name, pid = ?process.id(), "stopping plugin process");
            process.kill();
        }
        tables.channels.clear();
        tables.parsers.clear();
        tables.outputs.clear();
        tables.processes.clear();
    }
}

/// 핸드셰이크로 받은 Unix 도메인 소켓 경로에 gRPC 채널을 연결합니다.
///
/// 스킴은 `unix://<addr>`로 해석됩니다. Endpoint의 URI는 커넥터가
/// 무시하는 자리표시자입니다.
async fn dial_unix(addr: &str) -> Result<Channel, tonic::transport::Error> {
    let path = addr.to_owned();
    Endpoint::try_from("http://[::]:50051")?
        .connect_with_connector(service_fn(move |_: Uri| UnixStream::connect(path.clone())))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(tag: &str) -> RegistryConfig {
        RegistryConfig {
            base_url: "https://github.com/kytheron-org".to_owned(),
            cache_dir: std::env::temp_dir()
                .join(format!("kytheron_registry_{}_{}", tag, std::process::id()))
                .display()
                .to_string(),
        }
    }

    #[tokio::test]
    async fn new_registry_is_empty() {
        let registry = PluginRegistry::new(&test_config("empty"));
        assert!(registry.is_empty().await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn unknown_parser_lookup_fails() {
        let registry = PluginRegistry::new(&test_config("unknown"));
        let err = registry.parser("cloudtrail").await.unwrap_err();
        assert!(matches!(err, PluginError::Unknown { .. }));
        assert!(err.to_string().contains("cloudtrail"));
    }

    #[tokio::test]
    async fn unknown_output_lookup_fails() {
        let registry = PluginRegistry::new(&test_config("unknown_out"));
        assert!(registry.output("console").await.is_err());
    }

    #[tokio::test]
    async fn dial_unix_fails_without_listener() {
        let missing = std::env::temp_dir().join(format!("kytheron_nosock_{}", std::process::id()));
        assert!(dial_unix(&missing.display().to_string()).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_on_empty_registry_is_noop() {
        let registry = PluginRegistry::new(&test_config("shutdown"));
        registry.shutdown().await;
        assert!(registry.is_empty().await);
    }
}
