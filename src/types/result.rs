use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use url::Url;

use super::error::SamplerError;
use super::Header;

/// Outcome of one logical sample. May own sub-results produced by embedded
/// resource downloads, redirects or pushed streams; parent success is the
/// AND over children unless embedded failures are explicitly ignored.
#[derive(Debug, Clone)]
pub struct SampleResult {
    pub label: String,
    pub method: String,
    pub url: Option<Url>,
    pub response_code: String,
    pub response_message: String,
    pub headers: Vec<Header>,
    /// Textual encoded size of the response headers plus 3 bytes for the
    /// blank line and separator. Existing header-size assertions depend on
    /// this exact accounting.
    pub header_size: usize,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub successful: bool,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub connect_time: Option<Duration>,
    pub latency: Option<Duration>,
    pub sub_results: Vec<SampleResult>,
}

impl SampleResult {
    pub fn new(label: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            method: method.into(),
            url: None,
            response_code: String::new(),
            response_message: String::new(),
            headers: Vec::new(),
            header_size: 0,
            body: Bytes::new(),
            content_type: None,
            successful: false,
            start: None,
            end: None,
            connect_time: None,
            latency: None,
            sub_results: Vec::new(),
        }
    }

    /// Error result carrying the error's identity as the response code and
    /// its message as the response message. Timestamps are stamped so
    /// duration metrics stay valid even for failed samples.
    pub fn error(label: impl Into<String>, method: impl Into<String>, err: &SamplerError) -> Self {
        let mut result = Self::new(label, method);
        result.response_code = err.code().to_string();
        result.response_message = err.to_string();
        result.successful = false;
        result.stamp_start();
        result.stamp_end();
        result
    }

    pub fn fail(&mut self, err: &SamplerError) {
        self.response_code = err.code().to_string();
        self.response_message = err.to_string();
        self.successful = false;
        self.stamp_start();
        self.stamp_end();
    }

    /// Set the start timestamp if it has not been set already.
    pub fn stamp_start(&mut self) {
        if self.start.is_none() {
            self.start = Some(Utc::now());
        }
    }

    /// Set the end timestamp if it has not been set already.
    pub fn stamp_end(&mut self) {
        if self.end.is_none() {
            self.end = Some(Utc::now());
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Success covers every non-error status, redirects included.
    pub fn status_is_success(status: u16) -> bool {
        (200..=399).contains(&status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Attach a secondary result, folding its success into this result's
    /// unless `ignore_failures` is set, in which case sub-result failures
    /// never affect the parent.
    pub fn attach_sub_result(&mut self, sub: SampleResult, ignore_failures: bool) {
        if !ignore_failures {
            self.successful = self.successful && sub.successful;
        }
        self.sub_results.push(sub);
    }
}

/// Header block size for metrics: the textual encoded size of every header
/// plus 3 bytes accounting for the blank line and separator.
pub fn header_block_size(headers: &[Header]) -> usize {
    headers
        .iter()
        .map(|header| header.encoded_len())
        .sum::<usize>()
        + 3
}
