//! 스트림 프로세서 — ingest → 파서 → parsed → 싱크의 2단계 파이프라인
//!
//! 세 개의 장기 실행 태스크(소스 소비자, 파서 소비자, 로그 싱크)를
//! 구동합니다. 태스크들은 종료 사유를 보고하는 채널로 합류하며,
//! [`Processor::run`]은 세 태스크가 모두 보고한 뒤 반환합니다.
//!
//! # 에러 정책
//!
//! 버스 읽기 타임아웃은 조용히 무시됩니다. 그 외의 런타임 에러는 warn
//! 레벨로 기록하고 루프를 계속합니다 — 잘못된 메시지 하나가 파이프라인을
//! 멈춰서는 안 됩니다. 파서 RPC 스트림 에러는 해당 RawLog의 처리만
//! 중단시킵니다.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use kytheron_core::error::{KytheronError, PipelineError};
use kytheron_core::{metrics as metric, INGEST_TOPIC, PARSED_TOPIC};
use kytheron_plugin_api::{ParsedLog, RawLog};
use kytheron_registry::PluginRegistry;

use crate::config::ProcessorConfig;
use crate::sink::LokiSink;

// TODO: RawLog의 source_type(또는 설정 라우팅 테이블)로 파서를 선택한다.
// 라우팅 의미론이 정해질 때까지는 cloudtrail 파서에 고정되어 있다.
const PARSER_NAME: &str = "cloudtrail";

/// 버스 폴링 타임아웃 — 루프가 이 주기로 종료 요청을 확인합니다
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// 스트림 프로세서
///
/// [`run`](Self::run)이 파이프라인 전체를 구동합니다. 종료는
/// [`cancellation_token`](Self::cancellation_token)으로 요청하며, 소비자
/// 루프는 다음 폴링 시한에 토큰을 확인하고 멈춥니다.
pub struct Processor {
    config: ProcessorConfig,
    registry: Arc<PluginRegistry>,
    cancel: CancellationToken,
}

impl Processor {
    /// 새 프로세서를 만듭니다.
    pub fn new(config: ProcessorConfig, registry: Arc<PluginRegistry>) -> Self {
        Self {
            config,
            registry,
            cancel: CancellationToken::new(),
        }
    }

    /// 파이프라인 종료를 요청할 수 있는 토큰을 반환합니다.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 세 태스크를 기동하고 모두 종료될 때까지 대기합니다.
    ///
    /// 컨슈머/프로듀서 생성 실패는 기동 실패로서 즉시 반환됩니다.
    pub async fn run(self) -> Result<(), KytheronError> {
        tracing::info!("starting stream processor");

        let source_consumer = create_consumer(
            &self.config.source_brokers,
            &self.config.group_id,
            "earliest",
            true,
        )?;
        source_consumer
            .subscribe(&[INGEST_TOPIC])
            .map_err(|e| PipelineError::BusRead(e.to_string()))?;

        // parsed 토픽 프로듀서는 소스 소비자 태스크가 소유하고 닫는다
        let parsed_producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.parser_brokers)
            .create()
            .map_err(|e| PipelineError::BusProduce(e.to_string()))?;

        let parser_consumer = create_consumer(
            &self.config.parser_brokers,
            &self.config.group_id,
            "latest",
            false,
        )?;
        parser_consumer
            .subscribe(&[PARSED_TOPIC])
            .map_err(|e| PipelineError::BusRead(e.to_string()))?;

        let sink = LokiSink::new(&self.config.loki_url);

        // 파서 소비자 → 싱크. 용량 1 채널이 백프레셔 지점이다:
        // 싱크가 느리면 parsed 토픽 소비가 멈춘다.
        let (task_tx, task_rx) = mpsc::channel::<ParsedLog>(1);
        let (exit_tx, mut exit_rx) = mpsc::channel::<String>(3);

        {
            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel.clone();
            let exit_tx = exit_tx.clone();
            tokio::spawn(async move {
                run_source_consumer(source_consumer, parsed_producer, registry, cancel).await;
                let _ = exit_tx.send("source consumer stopped".to_owned()).await;
            });
        }

        {
            let cancel = self.cancel.clone();
            let exit_tx = exit_tx.clone();
            tokio::spawn(async move {
                run_parser_consumer(parser_consumer, task_tx, cancel).await;
                let _ = exit_tx.send("parser consumer stopped".to_owned()).await;
            });
        }

        {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                run_log_sink(sink, task_rx, cancel).await;
                let _ = exit_tx.send("log sink closed".to_owned()).await;
            });
        }

        for _ in 0..3 {
            if let Some(reason) = exit_rx.recv().await {
                tracing::info!(task = %reason, "processor task finished");
            }
        }

        tracing::info!("stream processor stopped");
        Ok(())
    }
}

/// StreamConsumer를 생성합니다. 생성 자체는 브로커에 연결하지 않습니다.
fn create_consumer(
    brokers: &str,
    group_id: &str,
    offset_reset: &str,
    auto_commit: bool,
) -> Result<StreamConsumer, PipelineError> {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("auto.offset.reset", offset_reset)
        .set("enable.auto.commit", if auto_commit { "true" } else { "false" })
        .create()
        .map_err(|e| PipelineError::BusRead(e.to_string()))
}

/// 소스 소비자 — ingest 토픽의 RawLog를 파서에 넘기고 parsed 토픽에 생산
async fn run_source_consumer(
    consumer: StreamConsumer,
    producer: FutureProducer,
    registry: Arc<PluginRegistry>,
    cancel: CancellationToken,
) {
    tracing::info!("starting source consumer");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let payload = match tokio::time::timeout(POLL_TIMEOUT, consumer.recv()).await {
            // 메시지 부재로 인한 타임아웃은 에러가 아니다
            Err(_) => continue,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, topic = INGEST_TOPIC, "failed to read message");
                continue;
            }
            Ok(Ok(message)) => message.payload().map(<[u8]>::to_vec),
        };

        let Some(payload) = payload else {
            continue;
        };

        metrics::counter!(metric::PROCESSOR_RAW_LOGS_TOTAL).increment(1);
        if let Err(e) = handle_ingest_message(&registry, &producer, &payload).await {
            metrics::counter!(metric::PROCESSOR_ERRORS_TOTAL).increment(1);
            tracing::warn!(error = %e, "failed to handle ingest message");
        }
    }
}

/// RawLog 하나를 파서 스트리밍 RPC에 넘기고 모든 프레임을 parsed 토픽에
/// 생산합니다. 스트림 종료는 에러가 아닙니다.
async fn handle_ingest_message(
    registry: &PluginRegistry,
    producer: &FutureProducer,
    payload: &[u8],
) -> Result<(), PipelineError> {
    let raw: RawLog =
        serde_json::from_slice(payload).map_err(|e| PipelineError::Serialize(e.to_string()))?;
    tracing::debug!(log_id = %raw.id, "ingest message decoded");

    let mut parser = registry
        .parser(PARSER_NAME)
        .await
        .map_err(|e| PipelineError::RpcStream(e.to_string()))?;

    let mut stream = parser
        .parse_log(raw.clone())
        .await
        .map_err(|e| PipelineError::RpcStream(e.to_string()))?
        .into_inner();

    while let Some(frame) = stream
        .message()
        .await
        .map_err(|e| PipelineError::RpcStream(e.to_string()))?
    {
        let parsed = stamp(frame, &raw.id);
        tracing::debug!(
            parsed_log_id = %parsed.id,
            log_id = %parsed.source_id,
            "parsed log received"
        );

        let content =
            serde_json::to_vec(&parsed).map_err(|e| PipelineError::Serialize(e.to_string()))?;
        let record = FutureRecord::<(), _>::to(PARSED_TOPIC).payload(&content);
        producer
            .send(record, Timeout::Never)
            .await
            .map_err(|(e, _)| PipelineError::BusProduce(e.to_string()))?;

        metrics::counter!(metric::PROCESSOR_PARSED_LOGS_TOTAL).increment(1);
        tracing::debug!(parsed_log_id = %parsed.id, "produced message to parsed topic");
    }

    Ok(())
}

/// 파서 프레임에 원본 id와 새 고유 id를 찍습니다.
///
/// `source_id`는 파싱을 일으킨 RawLog의 id이며, `id`는 방출된 레코드마다
/// 새로 할당됩니다 — RawLog 하나가 여러 ParsedLog로 전개되어도 각각
/// 고유한 id와 공통의 source_id를 갖습니다.
fn stamp(mut frame: ParsedLog, source_id: &str) -> ParsedLog {
    frame.source_id = source_id.to_owned();
    frame.id = Uuid::new_v4().to_string();
    frame
}

/// 파서 소비자 — parsed 토픽의 레코드를 싱크 태스크 채널에 전달
async fn run_parser_consumer(
    consumer: StreamConsumer,
    task_tx: mpsc::Sender<ParsedLog>,
    cancel: CancellationToken,
) {
    tracing::info!("starting parser consumer");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let payload = match tokio::time::timeout(POLL_TIMEOUT, consumer.recv()).await {
            Err(_) => continue,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, topic = PARSED_TOPIC, "failed to read message");
                continue;
            }
            Ok(Ok(message)) => message.payload().map(<[u8]>::to_vec),
        };

        let Some(payload) = payload else {
            continue;
        };

        let parsed: ParsedLog = match serde_json::from_slice(&payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode parsed message");
                continue;
            }
        };

        tracing::debug!(
            log_id = %parsed.source_id,
            parsed_log_id = %parsed.id,
            "parsed message decoded"
        );

        // 채널 전송이 백프레셔 지점이다: 싱크가 느리면 여기서 멈춘다
        if task_tx.send(parsed).await.is_err() {
            tracing::warn!("log sink channel closed, stopping parser consumer");
            break;
        }
    }
}

/// 로그 싱크 — 태스크 채널의 레코드를 저장소로 전송
///
/// 전송 실패는 기록 후 레코드를 드롭합니다 (at-most-once).
async fn run_log_sink(
    sink: LokiSink,
    mut task_rx: mpsc::Receiver<ParsedLog>,
    cancel: CancellationToken,
) {
    tracing::info!("starting log sink");

    loop {
        tokio::select! {
            maybe_log = task_rx.recv() => {
                let Some(log) = maybe_log else {
                    break;
                };
                match sink.push(&log).await {
                    Ok(()) => {
                        metrics::counter!(metric::SINK_PUSH_TOTAL).increment(1);
                    }
                    Err(e) => {
                        metrics::counter!(metric::SINK_PUSH_FAILED_TOTAL).increment(1);
                        tracing::warn!(
                            error = %e,
                            parsed_log_id = %log.id,
                            "failed to send payload, dropping record"
                        );
                    }
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_assigns_fresh_unique_ids() {
        let frame = ParsedLog {
            id: "plugin-assigned".to_owned(),
            source_id: String::new(),
            source_type: "aws_cloudtrail".to_owned(),
            source_name: "account-x".to_owned(),
            data: b"event".to_vec(),
        };

        let first = stamp(frame.clone(), "raw-1");
        let second = stamp(frame, "raw-1");

        assert_eq!(first.source_id, "raw-1");
        assert_eq!(second.source_id, "raw-1");
        assert_ne!(first.id, second.id);
        assert_ne!(first.id, "plugin-assigned");
        assert!(!first.id.is_empty());
    }

    #[test]
    fn stamp_preserves_payload_fields() {
        let frame = ParsedLog {
            id: String::new(),
            source_id: String::new(),
            source_type: "aws_cloudtrail".to_owned(),
            source_name: "account-x".to_owned(),
            data: b"event".to_vec(),
        };
        let stamped = stamp(frame, "raw-9");
        assert_eq!(stamped.source_type, "aws_cloudtrail");
        assert_eq!(stamped.source_name, "account-x");
        assert_eq!(stamped.data, b"event");
    }

    #[tokio::test]
    async fn create_consumer_accepts_valid_config() {
        // 생성은 브로커에 연결하지 않으므로 임의 주소로도 성공한다
        let consumer = create_consumer("localhost:9092", "kytheron", "earliest", true);
        assert!(consumer.is_ok());
    }

    #[cfg(unix)]
    mod parser_stream {
        use super::super::*;

        use tokio_stream::wrappers::{ReceiverStream, UnixListenerStream};
        use tonic::{Request, Response, Status};

        use kytheron_plugin_api::plugin::parser_plugin_server::{
            ParserPlugin, ParserPluginServer,
        };
        use kytheron_plugin_api::ParserPluginClient;

        /// RawLog 하나당 세 프레임을 순서대로 돌려주는 목 파서
        struct FanOutParser;

        #[tonic::async_trait]
        impl ParserPlugin for FanOutParser {
            type ParseLogStream = ReceiverStream<Result<ParsedLog, Status>>;

            async fn parse_log(
                &self,
                request: Request<RawLog>,
            ) -> Result<Response<Self::ParseLogStream>, Status> {
                let raw = request.into_inner();
                let (tx, rx) = mpsc::channel(4);
                tokio::spawn(async move {
                    for i in 0..3 {
                        let frame = ParsedLog {
                            id: String::new(),
                            source_id: String::new(),
                            source_type: raw.source_type.clone(),
                            source_name: raw.source_name.clone(),
                            data: format!("frame-{i}").into_bytes(),
                        };
                        if tx.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                });
                Ok(Response::new(ReceiverStream::new(rx)))
            }
        }

        async fn connect_mock_parser() -> ParserPluginClient<tonic::transport::Channel> {
            let dir = std::env::temp_dir()
                .join(format!("kytheron_proc_stream_{}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            let sock_path = dir.join(format!("parser-{}.sock", Uuid::new_v4()));

            let listener = tokio::net::UnixListener::bind(&sock_path).unwrap();
            tokio::spawn(async move {
                let _ = tonic::transport::Server::builder()
                    .add_service(ParserPluginServer::new(FanOutParser))
                    .serve_with_incoming(UnixListenerStream::new(listener))
                    .await;
            });

            let path = sock_path.display().to_string();
            let channel = tonic::transport::Endpoint::try_from("http://[::]:50051")
                .unwrap()
                .connect_with_connector(tower::service_fn(move |_: tonic::transport::Uri| {
                    tokio::net::UnixStream::connect(path.clone())
                }))
                .await
                .unwrap();
            ParserPluginClient::new(channel)
        }

        /// 파서 팬아웃: 프레임 세 개가 같은 source_id와 서로 다른 id를 갖는다
        #[tokio::test]
        async fn parser_fan_out_stamps_every_frame() {
            let mut client = connect_mock_parser().await;

            let raw = RawLog {
                id: "raw-42".to_owned(),
                source_type: "aws_cloudtrail".to_owned(),
                source_name: "account-x".to_owned(),
                data: b"{}".to_vec(),
            };

            let mut stream = client.parse_log(raw.clone()).await.unwrap().into_inner();
            let mut stamped = Vec::new();
            while let Some(frame) = stream.message().await.unwrap() {
                stamped.push(stamp(frame, &raw.id));
            }

            assert_eq!(stamped.len(), 3);
            assert!(stamped.iter().all(|p| p.source_id == "raw-42"));

            let mut ids: Vec<&str> = stamped.iter().map(|p| p.id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), 3, "every parsed log id must be distinct");

            // 파서가 전달한 순서가 유지된다
            assert_eq!(stamped[0].data, b"frame-0");
            assert_eq!(stamped[1].data, b"frame-1");
            assert_eq!(stamped[2].data, b"frame-2");
        }
    }
}
