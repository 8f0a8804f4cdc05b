//! 아티팩트 다운로드와 캐시 — 스트리밍 SHA-256 검증을 포함합니다.
//!
//! 다운로드는 최종 경로의 `.tmp` 이웃 파일에 기록하면서 동시에 해시를
//! 계산하고, 체크섬이 일치할 때만 원자적으로 rename합니다. 중단된
//! 다운로드가 남긴 임시 파일은 다음 시도에서 덮어써집니다.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use kytheron_core::error::PluginError;

use crate::manifest::PluginManifest;

/// 파일의 SHA-256을 계산합니다. 읽을 수 없으면 `None`을 반환합니다.
pub async fn file_sha256(path: impl AsRef<Path>) -> Option<String> {
    let contents = tokio::fs::read(path).await.ok()?;
    Some(hex::encode(Sha256::digest(&contents)))
}

/// 캐시된 바이너리가 기대 체크섬과 일치하는지 확인합니다.
///
/// 파일이 없거나, 읽을 수 없거나, 체크섬이 다르면 (이전에 중단된
/// 다운로드 포함) 캐시 미스로 취급합니다.
pub async fn is_cached(path: impl AsRef<Path>, expected_checksum: &str) -> bool {
    match file_sha256(path).await {
        Some(actual) => actual.eq_ignore_ascii_case(expected_checksum),
        None => false,
    }
}

/// 플러그인 바이너리가 캐시에 있도록 보장하고 설치 경로를 반환합니다.
///
/// 체크섬이 일치하는 캐시가 있으면 다운로드를 건너뜁니다. 그렇지 않으면
/// 매니페스트의 URL에서 스트리밍으로 받아 `.tmp` 파일과 해시에 동시에
/// 기록하고, 검증 후 실행 권한을 부여하고 원자적으로 설치합니다.
pub async fn ensure_cached(
    client: &reqwest::Client,
    manifest: &PluginManifest,
    cache_dir: impl AsRef<Path>,
) -> Result<PathBuf, PluginError> {
    let binary = manifest.binary_for_host()?;
    let path = manifest.cached_binary_path(&cache_dir);

    if is_cached(&path, &binary.checksum).await {
        tracing::info!(
            plugin = %manifest.name,
            version = %manifest.version,
            path = %path.display(),
            "plugin already cached"
        );
        return Ok(path);
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PluginError::Download {
                name: manifest.name.clone(),
                reason: format!("failed to create plugin directory: {e}"),
            })?;
    }

    tracing::info!(
        plugin = %manifest.name,
        version = %manifest.version,
        url = %binary.url,
        "downloading plugin"
    );

    let response = client
        .get(binary.url.as_str())
        .send()
        .await
        .map_err(|e| PluginError::Download {
            name: manifest.name.clone(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(PluginError::Download {
            name: manifest.name.clone(),
            reason: format!("download failed with status: {}", response.status()),
        });
    }

    // .tmp 이웃에 기록하면서 해시를 같이 계산한다
    let temp_path = temp_sibling(&path);
    let mut temp_file =
        tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| PluginError::Download {
                name: manifest.name.clone(),
                reason: format!("failed to create temp file: {e}"),
            })?;

    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(PluginError::Download {
                    name: manifest.name.clone(),
                    reason: e.to_string(),
                });
            }
        };
        hasher.update(&chunk);
        if let Err(e) = temp_file.write_all(&chunk).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(PluginError::Download {
                name: manifest.name.clone(),
                reason: format!("failed to write plugin: {e}"),
            });
        }
    }

    if let Err(e) = temp_file.flush().await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(PluginError::Download {
            name: manifest.name.clone(),
            reason: format!("failed to flush plugin: {e}"),
        });
    }
    drop(temp_file);

    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(&binary.checksum) {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(PluginError::ChecksumMismatch {
            name: manifest.name.clone(),
            expected: binary.checksum.clone(),
            actual,
        });
    }

    make_executable(&temp_path)
        .await
        .map_err(|e| PluginError::Download {
            name: manifest.name.clone(),
            reason: format!("failed to make plugin executable: {e}"),
        })?;

    tokio::fs::rename(&temp_path, &path)
        .await
        .map_err(|e| PluginError::Download {
            name: manifest.name.clone(),
            reason: format!("failed to move plugin: {e}"),
        })?;

    metrics::counter!(kytheron_core::metrics::REGISTRY_DOWNLOADS_TOTAL).increment(1);
    tracing::info!(
        plugin = %manifest.name,
        version = %manifest.version,
        path = %path.display(),
        "plugin downloaded and verified"
    );

    Ok(path)
}

/// 최종 경로의 `.tmp` 이웃 경로를 만듭니다.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_owned();
    os_string.push(".tmp");
    PathBuf::from(os_string)
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(0o755);
    tokio::fs::set_permissions(path, permissions).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kytheron_fetch_{}_{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn file_sha256_known_value() {
        let dir = temp_dir("sha");
        let path = dir.join("data");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let digest = file_sha256(&path).await.unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_sha256_missing_file_is_none() {
        let path = std::env::temp_dir().join(format!("kytheron_missing_{}", std::process::id()));
        assert!(file_sha256(&path).await.is_none());
    }

    #[tokio::test]
    async fn is_cached_accepts_matching_checksum() {
        let dir = temp_dir("hit");
        let path = dir.join("plugin");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        assert!(
            is_cached(
                &path,
                "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
            )
            .await
        );
        // 대소문자 구분 없이 비교
        assert!(
            is_cached(
                &path,
                "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
            )
            .await
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn is_cached_rejects_corrupted_file() {
        let dir = temp_dir("miss");
        let path = dir.join("plugin");
        // 부분 다운로드를 가장한 손상된 내용
        tokio::fs::write(&path, b"hello wor").await.unwrap();

        assert!(
            !is_cached(
                &path,
                "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
            )
            .await
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn temp_sibling_appends_tmp() {
        let path = Path::new("/cache/cloudtrail/v1/cloudtrail");
        assert_eq!(
            temp_sibling(path),
            PathBuf::from("/cache/cloudtrail/v1/cloudtrail.tmp")
        );
    }
}
