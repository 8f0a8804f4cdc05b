//! 인그레스 gRPC 서버 — 수집기 업로드를 ingest 토픽으로 전달
//!
//! 수집기는 `SourcePlugin.StreamLogs`로 RawLog를 스트리밍합니다. 서버는
//! 프레임마다 새 id를 할당하고 JSON으로 직렬화하여 source 브로커의
//! ingest 토픽에 생산합니다. 생산 에러는 스트림을 종료시키고
//! 클라이언트에 상태로 드러납니다.
//!
//! 바인드 직후 stdout에 핸드셰이크 한 줄을 출력합니다 — 이 바이너리를
//! 다른 호스트가 플러그인으로 기동하면 그 줄에서 주소를 읽습니다.

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use uuid::Uuid;

use kytheron_core::config::KytheronConfig;
use kytheron_core::error::{KytheronError, PipelineError};
use kytheron_core::{metrics as metric, INGEST_TOPIC};
use kytheron_plugin_api::plugin::source_plugin_server::{SourcePlugin, SourcePluginServer};
use kytheron_plugin_api::{Empty, Handshake, RawLog};

/// 인그레스 서버 설정
#[derive(Debug, Clone)]
pub struct IngressConfig {
    /// 수신 TCP 포트 (0이면 임의 포트)
    pub port: u16,
    /// gRPC 송신 메시지 최대 크기 (바이트)
    pub max_send_message_size: usize,
    /// gRPC 수신 메시지 최대 크기 (바이트)
    pub max_recv_message_size: usize,
    /// ingest 토픽이 있는 source 브로커 주소
    pub source_brokers: String,
}

impl IngressConfig {
    /// core 설정에서 인그레스 설정을 만듭니다.
    pub fn from_core(config: &KytheronConfig) -> Self {
        Self {
            port: config.server.grpc.port,
            max_send_message_size: config.server.grpc.max_send_message_size,
            max_recv_message_size: config.server.grpc.max_recv_message_size,
            source_brokers: config.kafka.source.url.clone(),
        }
    }
}

/// `SourcePlugin` 서비스 구현
struct SourceService {
    producer: FutureProducer,
    /// UUID v1 노드 식별자 — 서버 인스턴스마다 무작위로 생성
    node_id: [u8; 6],
}

impl SourceService {
    fn new(producer: FutureProducer) -> Self {
        let mut node_id = [0u8; 6];
        node_id.copy_from_slice(&Uuid::new_v4().as_bytes()[..6]);
        Self { producer, node_id }
    }
}

#[tonic::async_trait]
impl SourcePlugin for SourceService {
    async fn stream_logs(
        &self,
        request: Request<Streaming<RawLog>>,
    ) -> Result<Response<Empty>, Status> {
        let mut stream = request.into_inner();

        while let Some(mut raw) = stream.message().await? {
            assign_id(&mut raw, &self.node_id);

            let content = serde_json::to_vec(&raw)
                .map_err(|e| Status::internal(format!("failed to encode raw log: {e}")))?;

            tracing::debug!(log_id = %raw.id, topic = INGEST_TOPIC, "producing message");
            let record = FutureRecord::<(), _>::to(INGEST_TOPIC).payload(&content);
            self.producer
                .send(record, Timeout::Never)
                .await
                .map_err(|(e, _)| Status::unavailable(format!("bus produce failed: {e}")))?;

            metrics::counter!(metric::INGRESS_LOGS_RECEIVED_TOTAL).increment(1);
        }

        Ok(Response::new(Empty {}))
    }
}

/// 프레임에 새 고유 id(UUID v1)를 할당합니다. 이후 id는 불변입니다.
fn assign_id(raw: &mut RawLog, node_id: &[u8; 6]) {
    raw.id = Uuid::now_v1(node_id).to_string();
}

/// 인그레스 서버를 기동하고 종료 시그널(SIGINT/SIGTERM)까지 구동합니다.
pub async fn serve(config: &IngressConfig) -> Result<(), KytheronError> {
    serve_with_shutdown(config, shutdown_signal()).await
}

/// 인그레스 서버를 기동하고 주어진 future가 완료되면 우아하게 종료합니다.
///
/// 바인드 직후 stdout에 핸드셰이크 한 줄을 출력합니다. 종료 시 새
/// 스트림은 받지 않고 진행 중인 호출은 완료되며, 반환 시 버스
/// 프로듀서가 닫힙니다.
pub async fn serve_with_shutdown(
    config: &IngressConfig,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<(), KytheronError> {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &config.source_brokers)
        .create()
        .map_err(|e| PipelineError::BusProduce(e.to_string()))?;

    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
    let addr = listener.local_addr()?;

    let service = SourcePluginServer::new(SourceService::new(producer))
        .max_decoding_message_size(config.max_recv_message_size)
        .max_encoding_message_size(config.max_send_message_size);

    // 부모 프로세스가 주소를 읽을 수 있도록 바인드 직후에 출력한다.
    // 이 줄 앞에 다른 stdout 출력이 있어서는 안 된다.
    {
        use std::io::Write;
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(Handshake::new(addr.to_string()).to_line().as_bytes());
        let _ = stdout.flush();
    }

    tracing::info!(address = %addr, "grpc server listening");

    Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .map_err(|e| PipelineError::RpcStream(e.to_string()))?;

    tracing::info!("grpc server stopped");
    Ok(())
}

/// SIGINT 또는 SIGTERM을 기다립니다.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sigint) => sigint,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };

    let signal_name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    tracing::info!(signal = signal_name, "shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
