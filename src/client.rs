use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::AbortHandle as TaskAbortHandle;
use tracing::debug;

use crate::config::ClientConfig;
use crate::future::{AbortHandle, RequestOutcome, ResponseCompleter, ResponseFuture};
use crate::registry::ConnectionKey;
use crate::types::{ClientTimeouts, HttpRequest, SamplerError};

/// The network-client boundary. One client owns one logical HTTP/2
/// connection; requests are issued without blocking and complete through
/// the returned [`ResponseFuture`].
pub trait Http2Client: Send {
    fn send(&mut self, request: HttpRequest) -> Result<ResponseFuture, SamplerError>;

    /// Clear cached authentication and cookie state without discarding the
    /// underlying connection. Called between logical test iterations.
    fn clear_state(&mut self);

    /// Stop the client and tear down its connection.
    fn close(&mut self) -> Result<(), SamplerError>;
}

/// Creates and starts a client for a connection key. Construction failure
/// is fatal for the sample that triggered it and is never cached.
pub trait ClientFactory: Send + Sync {
    fn create(
        &self,
        key: &ConnectionKey,
        config: &ClientConfig,
    ) -> Result<Box<dyn Http2Client>, SamplerError>;
}

/// The opaque wire-protocol collaborator. Runs on the client's own I/O
/// threads; everything above it only sees "send request, get outcome".
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn exchange(&self, request: HttpRequest) -> RequestOutcome;

    /// Drop per-connection credential and cookie caches, keeping the
    /// connection itself alive.
    fn clear_state(&self) {}

    fn close(&self) {}
}

struct TaskAbort(TaskAbortHandle);

impl AbortHandle for TaskAbort {
    fn abort(&self) -> bool {
        if self.0.is_finished() {
            return false;
        }
        self.0.abort();
        true
    }
}

/// Default [`Http2Client`]: fires each request as a task on a shared tokio
/// runtime and completes the future from that task, so virtual-user
/// threads never touch the socket.
pub struct SpawningClient<T: Transport> {
    transport: Arc<T>,
    handle: Handle,
    timeouts: ClientTimeouts,
}

impl<T: Transport> SpawningClient<T> {
    pub fn new(transport: Arc<T>, handle: Handle, timeouts: ClientTimeouts) -> Self {
        Self {
            transport,
            handle,
            timeouts,
        }
    }

    async fn run_exchange(
        transport: Arc<T>,
        request: HttpRequest,
        limit: Option<std::time::Duration>,
        completer: ResponseCompleter,
    ) {
        if completer.is_cancelled() {
            return;
        }
        let outcome = match limit {
            Some(limit) => match tokio::time::timeout(limit, transport.exchange(request)).await {
                Ok(outcome) => outcome,
                Err(_) => RequestOutcome::Failure {
                    error: SamplerError::Timeout,
                    partial: None,
                },
            },
            None => transport.exchange(request).await,
        };
        completer.complete(outcome);
    }
}

impl<T: Transport> Http2Client for SpawningClient<T> {
    fn send(&mut self, request: HttpRequest) -> Result<ResponseFuture, SamplerError> {
        let timeouts = request.timeouts(&self.timeouts);
        debug!(method = %request.method, target = %request.target, "issuing request");

        let (mut future, completer) = ResponseFuture::new();
        let transport = self.transport.clone();
        let join = self.handle.spawn(Self::run_exchange(
            transport,
            request,
            timeouts.response,
            completer,
        ));
        future.set_abort_handle(Box::new(TaskAbort(join.abort_handle())));
        Ok(future)
    }

    fn clear_state(&mut self) {
        self.transport.clear_state();
    }

    fn close(&mut self) -> Result<(), SamplerError> {
        self.transport.close();
        Ok(())
    }
}
