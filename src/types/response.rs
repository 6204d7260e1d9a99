use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;

use super::Header;

/// Timing marks reported by the network client, all measured from the
/// moment the request was issued: connection established, first response
/// byte, last response byte.
#[derive(Debug, Clone, Default)]
pub struct TimingMarks {
    pub connect_end: Option<Duration>,
    pub latency_end: Option<Duration>,
    pub response_end: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_message: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
    pub trailers: Option<Vec<Header>>,
    pub timings: TimingMarks,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_message: String::new(),
            headers: Vec::new(),
            body: Bytes::new(),
            trailers: None,
            timings: TimingMarks::default(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header_value("content-type")
    }
}
