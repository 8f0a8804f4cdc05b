//! 플러그인 매니페스트 — 이름/버전을 다운로드 가능한 바이너리로 해석
//!
//! 매니페스트는 설정에 선언된 플러그인에서 파생되며, os_arch 키를
//! 바이너리 디스크립터 {url, checksum}에 매핑합니다. 아티팩트 URL은
//! 결정적 템플릿을 따릅니다:
//!
//! ```text
//! <base>/kytheron-plugin-<name>/releases/download/<version>/kytheron-plugin-<name>_<os>_<arch>
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use kytheron_core::error::PluginError;

/// 단일 플랫폼용 바이너리 디스크립터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binary {
    /// 아티팩트 다운로드 URL
    pub url: String,
    /// SHA-256 체크섬 (hex)
    pub checksum: String,
}

/// 플러그인 매니페스트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// 플러그인 이름
    pub name: String,
    /// 플러그인 버전 (릴리스 태그)
    pub version: String,
    /// os_arch 키 → 바이너리 매핑
    pub binaries: HashMap<String, Binary>,
}

/// 현재 호스트의 os_arch 키를 반환합니다 (예: "linux_x86_64").
pub fn host_platform() -> String {
    format!("{}_{}", std::env::consts::OS, std::env::consts::ARCH)
}

impl PluginManifest {
    /// 설정된 플러그인 선언에서 호스트 플랫폼용 매니페스트를 구성합니다.
    pub fn for_release(base_url: &str, name: &str, version: &str, checksum: &str) -> Self {
        let platform = host_platform();
        let url = format!(
            "{base}/kytheron-plugin-{name}/releases/download/{version}/kytheron-plugin-{name}_{os}_{arch}",
            base = base_url.trim_end_matches('/'),
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
        );

        let mut binaries = HashMap::new();
        binaries.insert(
            platform,
            Binary {
                url,
                checksum: checksum.to_ascii_lowercase(),
            },
        );

        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            binaries,
        }
    }

    /// 호스트 플랫폼용 바이너리 디스크립터를 찾습니다.
    pub fn binary_for_host(&self) -> Result<&Binary, PluginError> {
        let platform = host_platform();
        self.binaries
            .get(&platform)
            .ok_or(PluginError::UnsupportedPlatform {
                name: self.name.clone(),
                platform,
            })
    }

    /// 캐시 디렉토리 안에서 이 플러그인이 설치될 경로를 반환합니다.
    ///
    /// 레이아웃: `<cache>/<name>/<version>/<name>` (Windows에서는 `.exe`)
    pub fn cached_binary_path(&self, cache_dir: impl AsRef<Path>) -> PathBuf {
        let file_name = if cfg!(windows) {
            format!("{}.exe", self.name)
        } else {
            self.name.clone()
        };
        cache_dir
            .as_ref()
            .join(&self.name)
            .join(&self.version)
            .join(file_name)
    }
}
