//! 플러그인 자식 프로세스 — 기동, 핸드셰이크 수신, stderr 드레인
//!
//! 자식은 stdout 첫 줄로 자신의 RPC 주소를 알립니다
//! ([`Handshake`](kytheron_plugin_api::Handshake) 참조). stderr는 파이프가
//! 가득 차 자식이 블록되지 않도록 별도 태스크에서 계속 읽어 시스템
//! 로거로 전달합니다.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use kytheron_core::error::PluginError;
use kytheron_plugin_api::Handshake;

/// 핸드셰이크 첫 줄을 기다리는 최대 시간
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// 레지스트리가 추적하는 플러그인 자식 프로세스
#[derive(Debug)]
pub struct PluginProcess {
    name: String,
    child: Child,
}

impl PluginProcess {
    /// 플러그인 이름을 반환합니다.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS 프로세스 ID를 반환합니다 (이미 종료되었으면 `None`).
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// 자식 프로세스에 종료 시그널을 보냅니다. Best-effort이며 실패는
    /// 무시됩니다.
    pub fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(plugin = %self.name, error = %e, "failed to kill plugin process");
        }
    }
}

/// 플러그인 바이너리를 기동하고 핸드셰이크로 알린 RPC 주소를 반환합니다.
///
/// stdout 첫 줄을 [`HANDSHAKE_TIMEOUT`] 안에 읽지 못하거나 형식이
/// 어긋나면 자식을 종료시키고 실패합니다. 성공 시 stderr 드레인 태스크가
/// 자식의 수명 동안 돌아갑니다.
pub async fn spawn(name: &str, binary_path: &Path) -> Result<(PluginProcess, String), PluginError> {
    let mut child = Command::new(binary_path)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| PluginError::Spawn {
            name: name.to_owned(),
            reason: e.to_string(),
        })?;

    let stdout = child.stdout.take().ok_or_else(|| PluginError::Spawn {
        name: name.to_owned(),
        reason: "failed to capture stdout".to_owned(),
    })?;
    let stderr = child.stderr.take();

    let mut process = PluginProcess {
        name: name.to_owned(),
        child,
    };

    // stderr 드레인: 자식이 가득 찬 파이프에 블록되지 않도록 계속 읽는다
    if let Some(stderr) = stderr {
        let plugin = name.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(plugin = %plugin, "plugin stderr: {line}");
            }
        });
    }

    // 핸드셰이크 첫 줄 수신
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    let read = tokio::time::timeout(HANDSHAKE_TIMEOUT, reader.read_line(&mut line)).await;

    let handshake = match read {
        Err(_) => {
            process.kill();
            return Err(PluginError::Handshake {
                name: name.to_owned(),
                reason: format!("timed out after {}s", HANDSHAKE_TIMEOUT.as_secs()),
            });
        }
        Ok(Err(e)) => {
            process.kill();
            return Err(PluginError::Handshake {
                name: name.to_owned(),
                reason: format!("failed to read handshake: {e}"),
            });
        }
        Ok(Ok(0)) => {
            process.kill();
            return Err(PluginError::Handshake {
                name: name.to_owned(),
                reason: "plugin exited before handshake".to_owned(),
            });
        }
        Ok(Ok(_)) => match Handshake::parse(&line) {
            Ok(handshake) => handshake,
            Err(e) => {
                process.kill();
                return Err(PluginError::Handshake {
                    name: name.to_owned(),
                    reason: e.to_string(),
                });
            }
        },
    };

    tracing::info!(plugin = %name, addr = %handshake.addr, "plugin started");
    Ok((process, handshake.addr))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn write_script(tag: &str, contents: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("kytheron_proc_{}_{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("plugin");
        std::fs::write(&path, contents).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn spawn_reads_handshake_line() {
        let script = write_script(
            "ok",
            "#!/bin/sh\necho '{\"type\":\"handshake\",\"addr\":\"/tmp/p.sock\"}'\nexec sleep 30\n",
        );

        let (mut process, addr) = spawn("test-plugin", &script).await.unwrap();
        assert_eq!(addr, "/tmp/p.sock");
        assert!(process.id().is_some());

        process.kill();
        let _ = std::fs::remove_dir_all(script.parent().unwrap());
    }

    #[tokio::test]
    async fn spawn_fails_on_malformed_handshake() {
        let script = write_script("bad", "#!/bin/sh\necho 'not a handshake'\nexec sleep 30\n");

        let err = spawn("test-plugin", &script).await.unwrap_err();
        assert!(matches!(err, PluginError::Handshake { .. }));

        let _ = std::fs::remove_dir_all(script.parent().unwrap());
    }

    #[tokio::test]
    async fn spawn_fails_when_plugin_exits_silently() {
        let script = write_script("exit", "#!/bin/sh\nexit 0\n");

        let err = spawn("test-plugin", &script).await.unwrap_err();
        assert!(matches!(err, PluginError::Handshake { .. }));
        assert!(err.to_string().contains("before handshake"));

        let _ = std::fs::remove_dir_all(script.parent().unwrap());
    }

    #[tokio::test]
    async fn spawn_fails_on_missing_binary() {
        let path = std::env::temp_dir().join(format!("kytheron_nosuch_{}", std::process::id()));
        let err = spawn("test-plugin", &path).await.unwrap_err();
        assert!(matches!(err, PluginError::Spawn { .. }));
    }
}
