//! hyper-based mock engine

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::recorder::{to_mapping, CapturedExchange, RecordSpec, RecordingSession};
use super::stubs::{stub_response, IncomingRequest, StubStore};
use super::{EngineConfig, MockEngine};
use crate::mapping::{self, load_mappings, write_mapping, MappingRecord};
use crate::network::{
    is_hop_by_hop, join_url, HttpClient, HttpHandler, OutgoingRequest, MAX_BODY_SIZE,
    SHUTDOWN_TIMEOUT_MS,
};
use crate::{Result, WirecordError};

/// Shared between the handle and the connection tasks
struct EngineState {
    config: EngineConfig,
    stubs: StubStore,
    recording: Mutex<Option<RecordingSession>>,
    client: HttpClient,
}

/// Embedded mock server
pub struct HttpMockEngine {
    state: Arc<EngineState>,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    server_task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpMockEngine {
    /// Bound address
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bound port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Configuration the engine was started with
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    /// All stubs in insertion order
    #[must_use]
    pub fn stub_mappings(&self) -> Vec<MappingRecord> {
        self.state.stubs.all()
    }

    /// Register a stub; persistent stubs are also written to disk
    ///
    /// # Errors
    ///
    /// Returns error if a persistent stub cannot be written
    pub fn add_stub_mapping(&self, record: MappingRecord) -> Result<MappingRecord> {
        let record = self.state.stubs.add(record);
        if record.persistent {
            self.state.persist(&record)?;
        }
        Ok(record)
    }

    /// Whether a recording session is open
    pub async fn is_recording(&self) -> bool {
        self.state.recording.lock().await.is_some()
    }
}

impl MockEngine for HttpMockEngine {
    async fn start(config: EngineConfig) -> Result<Self> {
        let stubs = StubStore::new();
        for (path, record) in load_mappings(&config.mappings_dir())? {
            debug!("Loaded stub {} from {}", record.id, path.display());
            stubs.add(record);
        }

        let addr = SocketAddr::new(config.bind_address, config.port.unwrap_or(0));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WirecordError::EngineBoot {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(
            "Mock engine listening on {} (root {}, {} stub(s))",
            local_addr,
            config.root_dir.display(),
            stubs.len()
        );

        let state = Arc::new(EngineState {
            config,
            stubs,
            recording: Mutex::new(None),
            client: HttpClient::new(),
        });
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let server_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&state),
            shutdown_rx,
            Arc::clone(&running),
        ));

        Ok(Self {
            state,
            local_addr,
            running,
            shutdown_tx,
            server_task: Mutex::new(Some(server_task)),
        })
    }

    async fn stop(&self) {
        self.shutdown_tx.send(()).ok();

        let Some(task) = self.server_task.lock().await.take() else {
            return;
        };

        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        match tokio::time::timeout(shutdown_timeout, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Mock engine task ended abnormally: {e}"),
            Err(_) => warn!("Mock engine did not stop within {shutdown_timeout:?}"),
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Mock engine on {} stopped", self.local_addr);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    async fn start_recording(&self, spec: RecordSpec) -> Result<()> {
        if !self.is_running() {
            return Err(WirecordError::EngineNotRunning);
        }
        spec.validate()?;

        let mut recording = self.state.recording.lock().await;
        if recording.is_some() {
            return Err(WirecordError::AlreadyRecording(None));
        }

        self.state.config.notifier.info(&format!(
            "Started recording with target {} (persistent: {})",
            spec.target_url, spec.persistent
        ));
        *recording = Some(RecordingSession::new(spec));
        Ok(())
    }

    async fn stop_recording(&self) -> Result<Vec<MappingRecord>> {
        let session = self
            .state
            .recording
            .lock()
            .await
            .take()
            .ok_or(WirecordError::NotRecording)?;
        let (spec, captured) = session.into_parts();

        let files_dir = self.state.config.files_dir();
        let mut records = Vec::with_capacity(captured.len());
        for exchange in &captured {
            let (record, failure) = to_mapping(exchange, &spec, &files_dir);
            if let Some(e) = failure {
                self.state.config.notifier.error(&format!(
                    "Could not extract body for stub {}: {e}",
                    record.id
                ));
            }

            let record = self.state.stubs.add(record);
            if record.persistent {
                if let Err(e) = self.state.persist(&record) {
                    self.state
                        .config
                        .notifier
                        .error(&format!("Could not persist stub {}: {e}", record.id));
                }
            }
            records.push(record);
        }

        self.state.config.notifier.info(&format!(
            "Stopped recording. Captured {} stub mapping(s)",
            records.len()
        ));
        Ok(records)
    }

    async fn edit_stub_mapping(&self, record: &MappingRecord) -> Result<()> {
        let updated = self.state.stubs.replace(record)?;
        if updated.persistent {
            self.state.persist(&updated)?;
        }
        Ok(())
    }
}

impl Drop for HttpMockEngine {
    fn drop(&mut self) {
        self.shutdown_tx.send(()).ok();
    }
}

impl EngineState {
    fn persist(&self, record: &MappingRecord) -> Result<()> {
        let file_name = mapping::safe_file_name(record);
        let path = write_mapping(&self.config.mappings_dir(), &file_name, record)?;
        debug!("Persisted stub {} to {}", record.id, path.display());
        Ok(())
    }

    async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let method = request.method().to_string();
        let url = HttpHandler::path_and_query(&request);
        let headers: Vec<(String, String)> = request
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("<invalid>").to_string(),
                )
            })
            .collect();

        let body = match HttpHandler::read_body(request.into_body(), MAX_BODY_SIZE).await {
            Ok(body) => body.to_vec(),
            Err(e) => return HttpHandler::error_response(&e),
        };

        let incoming = IncomingRequest {
            method,
            url,
            headers,
            body,
        };

        let spec = self
            .recording
            .lock()
            .await
            .as_ref()
            .map(|session| session.spec().clone());

        match spec {
            Some(spec) => self.forward_and_capture(&spec, incoming).await,
            None => self.serve_from_stubs(&incoming),
        }
    }

    async fn forward_and_capture(
        &self,
        spec: &RecordSpec,
        incoming: IncomingRequest,
    ) -> Response<Full<Bytes>> {
        let url = join_url(&spec.target_url, &incoming.url);
        let forwarded = self
            .client
            .send(&OutgoingRequest {
                method: &incoming.method,
                url: &url,
                headers: &incoming.headers,
                body: &incoming.body,
            })
            .await;

        let response = match forwarded {
            Ok(response) => response,
            Err(e) => {
                self.config
                    .notifier
                    .error(&format!("Could not forward {} {url}: {e}", incoming.method));
                return HttpHandler::error_response(&e);
            }
        };

        let headers: Vec<(String, String)> = response
            .headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name) && !name.eq_ignore_ascii_case("content-length"))
            .cloned()
            .collect();
        let reply = HttpHandler::create_response(
            response.status,
            &headers,
            Bytes::copy_from_slice(&response.body),
        );

        match self.recording.lock().await.as_mut() {
            Some(session) => {
                debug!("Captured {} {} -> {}", incoming.method, incoming.url, response.status);
                session.capture(CapturedExchange {
                    request: incoming,
                    response,
                });
            }
            None => debug!("Recording closed before {} completed", incoming.url),
        }

        reply
    }

    fn serve_from_stubs(&self, incoming: &IncomingRequest) -> Response<Full<Bytes>> {
        let Some(record) = self.stubs.find_match(&incoming.method, &incoming.url) else {
            debug!("No stub for {} {}", incoming.method, incoming.url);
            return HttpHandler::text_response(
                StatusCode::NOT_FOUND,
                "No response could be served as there are no stub mappings matching the request",
            );
        };

        match stub_response(
            &record,
            incoming,
            &self.config.files_dir(),
            self.config.response_templating,
        ) {
            Ok((status, headers, body)) => HttpHandler::create_response(status, &headers, body),
            Err(e) => {
                error!("Stub {} could not be served: {e}", record.id);
                HttpHandler::error_response(&e)
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<EngineState>,
    mut shutdown_rx: broadcast::Receiver<()>,
    running: Arc<AtomicBool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let state = Arc::clone(&state);
                        connections.spawn(async move {
                            let service = service_fn(move |request| {
                                let state = Arc::clone(&state);
                                async move { Ok::<_, Infallible>(state.handle(request).await) }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                debug!("Connection from {} ended: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.recv() => {
                debug!("Accept loop shutting down");
                break;
            }
        }
    }

    connections.shutdown().await;
    running.store(false, Ordering::SeqCst);
}
