use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::BTreeMap;
use std::sync::Mutex;
use url::Url;

use crate::types::{Header, HttpRequest, HttpResponse, SampleResult};
use crate::utils::parse_set_cookie;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Digest,
}

#[derive(Debug, Clone)]
pub struct Credential {
    pub scheme: AuthScheme,
    pub realm: String,
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn basic(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            scheme: AuthScheme::Basic,
            realm: String::new(),
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn matches(&self, url: &Url) -> bool {
        url.as_str().starts_with(&self.url)
    }

    /// `Authorization` value for preemptive Basic authentication. Digest
    /// needs a server challenge first and cannot be pre-seeded.
    pub fn authorization_value(&self) -> Option<String> {
        match self.scheme {
            AuthScheme::Basic => {
                let pair = format!("{}:{}", self.username, self.password);
                Some(format!("Basic {}", BASE64.encode(pair.as_bytes())))
            }
            AuthScheme::Digest => None,
        }
    }
}

/// Stored-credential collaborator.
pub trait AuthSupplier: Send + Sync {
    fn for_each_credential(&self, f: &mut dyn FnMut(&Credential));

    fn credential_for(&self, url: &Url) -> Option<Credential> {
        let mut found = None;
        self.for_each_credential(&mut |credential| {
            if found.is_none() && credential.matches(url) {
                found = Some(credential.clone());
            }
        });
        found
    }
}

/// Cookie collaborator: supplies a `Cookie` header per URL and ingests
/// `Set-Cookie` headers from responses.
pub trait CookieJar: Send + Sync {
    fn cookie_header_for(&self, url: &Url) -> Option<String>;
    fn ingest(&self, set_cookie: &str, url: &Url);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedResourcePolicy {
    /// Do not produce a sample at all for a cached resource.
    Suppress,
    /// Synthesize a 200 result without touching the network.
    SynthesizeOk,
    /// Synthesize a result with a configured code and message.
    Synthesize,
}

/// Cache collaborator. The executor asks it before sending and reports
/// response metadata after.
pub trait CacheHandler: Send + Sync {
    fn apply_conditional_headers(&self, url: &Url, request: &mut HttpRequest);
    fn is_cached(&self, url: &Url, headers: &[Header]) -> bool;
    fn record_response(&self, response: &HttpResponse, result: &mut SampleResult);
    fn cached_policy(&self) -> CachedResourcePolicy;
    /// Code and message used when the policy is [`CachedResourcePolicy::Synthesize`].
    fn synthesized_status(&self) -> (String, String) {
        ("204".to_string(), "resource cached".to_string())
    }
}

/// Simple host-wide cookie jar. Enough for tests and single-host plans;
/// production engines supply their own domain/path-aware implementation
/// through the [`CookieJar`] seam.
#[derive(Debug, Default)]
pub struct InMemoryCookieJar {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cookie(&self, name: impl Into<String>, value: impl Into<String>) {
        self.entries
            .lock()
            .unwrap()
            .insert(name.into(), value.into());
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl CookieJar for InMemoryCookieJar {
    fn cookie_header_for(&self, _url: &Url) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        if entries.is_empty() {
            return None;
        }

        let mut value = String::new();
        let mut first = true;
        for (name, cookie) in entries.iter() {
            if !first {
                value.push_str("; ");
            }
            value.push_str(name);
            value.push('=');
            value.push_str(cookie);
            first = false;
        }
        Some(value)
    }

    fn ingest(&self, set_cookie: &str, _url: &Url) {
        if let Some((name, value)) = parse_set_cookie(set_cookie) {
            let mut entries = self.entries.lock().unwrap();
            if value.is_empty() {
                entries.remove(&name);
            } else {
                entries.insert(name, value);
            }
        }
    }
}
