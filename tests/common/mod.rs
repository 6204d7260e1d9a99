use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;

use h2sampler::{
    ClientConfig, ClientFactory, ConnectionKey, Header, Http2Client, HttpRequest, HttpResponse,
    RequestOutcome, SamplerError, SpawningClient, TimingMarks, Transport, WorkerContext,
};

/// Scripted behavior for one request path.
#[derive(Clone)]
pub enum Script {
    Respond {
        status: u16,
        headers: Vec<Header>,
        body: Bytes,
        delay: Duration,
    },
    Fail {
        message: String,
        partial: Option<HttpResponse>,
    },
    /// Never completes; used to exercise deadlines and cancellation.
    Hang,
}

impl Script {
    pub fn ok(body: &str) -> Self {
        Script::Respond {
            status: 200,
            headers: vec![Header::new("content-type", "text/plain")],
            body: Bytes::copy_from_slice(body.as_bytes()),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Script::Respond {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(body: &str, delay: Duration) -> Self {
        Script::Respond {
            status: 200,
            headers: vec![Header::new("content-type", "text/plain")],
            body: Bytes::copy_from_slice(body.as_bytes()),
            delay,
        }
    }
}

/// In-memory stand-in for the HTTP/2 wire client: answers from a routing
/// table keyed by request path and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<HttpRequest>>,
    cleared: AtomicUsize,
    closed: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, path: &str, script: Script) {
        self.routes.lock().unwrap().insert(path.to_string(), script);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn cleared_count(&self) -> usize {
        self.cleared.load(Ordering::Acquire)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exchange(&self, request: HttpRequest) -> RequestOutcome {
        let path = request.target.path().to_string();
        self.requests.lock().unwrap().push(request);

        let script = self.routes.lock().unwrap().get(&path).cloned();
        match script {
            Some(Script::Respond {
                status,
                headers,
                body,
                delay,
            }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                RequestOutcome::Success(HttpResponse {
                    status,
                    status_message: String::new(),
                    headers,
                    body,
                    trailers: None,
                    timings: TimingMarks {
                        connect_end: Some(Duration::from_millis(1)),
                        latency_end: Some(delay),
                        response_end: Some(delay),
                    },
                })
            }
            Some(Script::Fail { message, partial }) => RequestOutcome::Failure {
                error: SamplerError::RequestFailed(message),
                partial,
            },
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                RequestOutcome::Failure {
                    error: SamplerError::Timeout,
                    partial: None,
                }
            }
            None => RequestOutcome::Success(HttpResponse::new(404)),
        }
    }

    fn clear_state(&self) {
        self.cleared.fetch_add(1, Ordering::AcqRel);
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::AcqRel);
    }
}

pub struct ScriptedFactory {
    transport: Arc<ScriptedTransport>,
    handle: tokio::runtime::Handle,
    created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(transport: Arc<ScriptedTransport>, handle: tokio::runtime::Handle) -> Arc<Self> {
        Arc::new(Self {
            transport,
            handle,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }
}

impl ClientFactory for ScriptedFactory {
    fn create(
        &self,
        _key: &ConnectionKey,
        config: &ClientConfig,
    ) -> Result<Box<dyn Http2Client>, SamplerError> {
        self.created.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(SpawningClient::new(
            self.transport.clone(),
            self.handle.clone(),
            config.timeouts.clone(),
        )))
    }
}

/// Runtime + transport + worker context wired together. The runtime must
/// outlive the context, so it travels with the harness.
pub struct Harness {
    pub runtime: Runtime,
    pub transport: Arc<ScriptedTransport>,
    pub factory: Arc<ScriptedFactory>,
}

impl Harness {
    pub fn new() -> Self {
        let runtime = Runtime::new().expect("tokio runtime");
        let transport = ScriptedTransport::new();
        let factory = ScriptedFactory::new(transport.clone(), runtime.handle().clone());
        Self {
            runtime,
            transport,
            factory,
        }
    }

    pub fn context(&self) -> WorkerContext {
        WorkerContext::new(ClientConfig::default(), self.factory.clone())
    }

    pub fn context_with(&self, config: ClientConfig) -> WorkerContext {
        WorkerContext::new(config, self.factory.clone())
    }
}
