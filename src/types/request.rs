use bytes::Bytes;

use super::error::SamplerError;
use super::timeouts::ClientTimeouts;
use super::{Header, Target};
use crate::utils::parse_target;

/// A fully built request handed to the network client. The executor owns
/// all construction rules (body encoding, header precedence); by the time a
/// request reaches the client it is final.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub target: Target,
    pub method: String,
    pub headers: Vec<Header>,
    pub body: Option<Bytes>,
    pub timeout: Option<ClientTimeouts>,
}

impl HttpRequest {
    pub fn new(target: &str, method: impl Into<String>) -> Result<Self, SamplerError> {
        Ok(Self {
            target: parse_target(target)?,
            method: method.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        })
    }

    pub fn from_target(target: Target, method: impl Into<String>) -> Self {
        Self {
            target,
            method: method.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn push_header(&mut self, header: Header) {
        self.headers.push(header);
    }

    pub fn set_body<B: Into<Bytes>>(&mut self, body: B) {
        self.body = Some(body.into());
    }

    pub fn set_timeout(&mut self, timeouts: ClientTimeouts) {
        self.timeout = Some(timeouts);
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|header| header.name.eq_ignore_ascii_case(name))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }

    /// Drop every header with the given name. Used to strip caller-supplied
    /// Content-Length, which the transport computes itself.
    pub fn remove_header(&mut self, name: &str) {
        self.headers
            .retain(|header| !header.name.eq_ignore_ascii_case(name));
    }

    pub fn timeouts(&self, fallback: &ClientTimeouts) -> ClientTimeouts {
        self.timeout.clone().unwrap_or_else(|| fallback.clone())
    }
}
