use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::{ClientFactory, Http2Client};
use crate::config::ClientConfig;
use crate::managers::{AuthSupplier, CacheHandler, CookieJar};
use crate::types::{ProxyConfig, SamplerError, Target};

/// Identity of a logical HTTP/2 destination. Two samplers with the same
/// destination and proxy settings share one cached client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub authority: String,
    pub has_proxy: bool,
    pub proxy_scheme: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
}

impl ConnectionKey {
    pub fn new(target: &Target, proxy: Option<&ProxyConfig>) -> Self {
        let authority = format!(
            "{}://{}:{}",
            target.scheme(),
            target.host().unwrap_or_default(),
            target.port().unwrap_or_default(),
        );
        match proxy {
            Some(proxy) => Self {
                authority,
                has_proxy: true,
                proxy_scheme: Some(proxy.scheme.clone()),
                proxy_host: Some(proxy.host.clone()),
                proxy_port: Some(proxy.port),
            },
            None => Self {
                authority,
                has_proxy: false,
                proxy_scheme: None,
                proxy_host: None,
                proxy_port: None,
            },
        }
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.authority)?;
        if let (Some(host), Some(port)) = (&self.proxy_host, self.proxy_port) {
            write!(f, " via {}:{}", host, port)?;
        }
        Ok(())
    }
}

/// Per-worker cache of live clients. Owned exclusively by one execution
/// thread; a continuation worker receives the whole context by move, never
/// a shared reference.
pub struct ConnectionRegistry {
    clients: HashMap<ConnectionKey, Box<dyn Http2Client>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Cached client for the key, creating and starting one on first use.
    /// A failed construction propagates and is not cached.
    pub fn get_or_create(
        &mut self,
        key: &ConnectionKey,
        factory: &dyn ClientFactory,
        config: &ClientConfig,
    ) -> Result<&mut Box<dyn Http2Client>, SamplerError> {
        if !self.clients.contains_key(key) {
            debug!(key = %key, "creating client");
            let client = factory.create(key, config)?;
            self.clients.insert(key.clone(), client);
        }
        Ok(self
            .clients
            .get_mut(key)
            .expect("client inserted just above"))
    }

    /// Stop and discard every cached client. Broken connections are logged
    /// and skipped so teardown always completes.
    pub fn close_all(&mut self) {
        for (key, mut client) in self.clients.drain() {
            if let Err(err) = client.close() {
                warn!(key = %key, error = %err, "failed to close client");
            }
        }
    }

    /// Clear cached credential and cookie state on every client while
    /// keeping the connections alive. Called between logical iterations.
    pub fn clear_credential_state(&mut self) {
        for client in self.clients.values_mut() {
            client.clear_state();
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Everything one virtual-user worker needs to execute samples: the
/// connection cache, connection-level configuration and the collaborator
/// seams. Passed explicitly through the execution path; a child worker
/// that is a true continuation of its parent takes the context by move,
/// any other worker builds a fresh one with an empty registry.
pub struct WorkerContext {
    pub config: ClientConfig,
    factory: Arc<dyn ClientFactory>,
    registry: ConnectionRegistry,
    pub cookies: Option<Arc<dyn CookieJar>>,
    pub auth: Option<Arc<dyn AuthSupplier>>,
    pub cache: Option<Arc<dyn CacheHandler>>,
}

impl WorkerContext {
    pub fn new(config: ClientConfig, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            config,
            factory,
            registry: ConnectionRegistry::new(),
            cookies: None,
            auth: None,
            cache: None,
        }
    }

    pub fn with_cookies(mut self, cookies: Arc<dyn CookieJar>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthSupplier>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheHandler>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn client_for(
        &mut self,
        key: &ConnectionKey,
    ) -> Result<&mut Box<dyn Http2Client>, SamplerError> {
        self.registry
            .get_or_create(key, self.factory.as_ref(), &self.config)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Teardown when the owning worker finishes or the whole run ends.
    pub fn close_all(&mut self) {
        self.registry.close_all();
    }

    pub fn clear_credential_state(&mut self) {
        self.registry.clear_credential_state();
    }
}
