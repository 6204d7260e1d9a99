use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::config::FanoutConfig;
use crate::future::RequestOutcome;
use crate::registry::{ConnectionKey, WorkerContext};
use crate::types::{
    header_block_size, HttpRequest, HttpResponse, SampleResult, SamplerError, Target,
};

/// Fixed polling interval of the concurrent-completion wait loop.
pub const FANOUT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Fixed pause between serial downloads.
pub const SERIAL_DOWNLOAD_DELAY: Duration = Duration::from_millis(10);
/// Deadline when neither the sampler nor the connection configures a
/// response timeout.
pub const DEFAULT_FANOUT_DEADLINE: Duration = Duration::from_secs(60);

/// Downloads the secondary resources of a primary result, serially or with
/// one async request per accepted URL under a shared deadline, and
/// aggregates the sub-results into the parent.
pub struct ResourceFanout {
    allow: Option<Regex>,
    deny: Option<Regex>,
    pool_size: usize,
    ignore_failures: bool,
    poll_interval: Duration,
    serial_delay: Duration,
    deadline: Option<Duration>,
}

impl ResourceFanout {
    /// Malformed patterns never abort the download pass: a broken allow
    /// pattern matches everything, a broken deny pattern matches nothing.
    pub fn new(config: &FanoutConfig) -> Self {
        let allow = compile_pattern(&config.allow_pattern, "allow");
        let deny = compile_pattern(&config.deny_pattern, "deny");
        Self {
            allow,
            deny,
            pool_size: config.pool_size,
            ignore_failures: config.ignore_embedded_failures,
            poll_interval: FANOUT_POLL_INTERVAL,
            serial_delay: SERIAL_DOWNLOAD_DELAY,
            deadline: None,
        }
    }

    /// Explicit shared deadline for the concurrent wait, overriding the
    /// response timeout derived from the connection configuration.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn serial_delay(mut self, delay: Duration) -> Self {
        self.serial_delay = delay;
        self
    }

    /// A URL is downloaded only if it matches the allow pattern and does
    /// not match the deny pattern.
    pub fn accepts(&self, url: &Url) -> bool {
        let text = url.as_str();
        let allowed = self.allow.as_ref().map_or(true, |re| re.is_match(text));
        let denied = self.deny.as_ref().map_or(false, |re| re.is_match(text));
        allowed && !denied
    }

    /// Extract, filter and download the embedded resources of the parent's
    /// body, attaching one sub-result per download.
    pub fn download_embedded(&self, parent: &mut SampleResult, ctx: &mut WorkerContext) {
        let base = match &parent.url {
            Some(url) => url.clone(),
            None => return,
        };
        let urls = extract_resource_urls(&base, &parent.text());
        self.download(parent, urls, ctx);
    }

    /// Download an already-parsed URL set. Concurrency degrades to serial
    /// when the configured parallelism is 1.
    pub fn download(&self, parent: &mut SampleResult, urls: Vec<Url>, ctx: &mut WorkerContext) {
        let accepted: Vec<Url> = urls.into_iter().filter(|url| self.accepts(url)).collect();
        if accepted.is_empty() {
            return;
        }

        if self.pool_size <= 1 {
            self.download_serial(parent, accepted, ctx);
        } else {
            self.download_concurrent(parent, accepted, ctx);
        }
    }

    /// One URL at a time on the calling thread, in source order. A failed
    /// download becomes an error sub-result and never aborts the rest.
    fn download_serial(&self, parent: &mut SampleResult, urls: Vec<Url>, ctx: &mut WorkerContext) {
        let last = urls.len().saturating_sub(1);
        for (index, url) in urls.into_iter().enumerate() {
            let sub = match self.fetch_one(&url, ctx) {
                Ok(sub) => sub,
                Err(err) => {
                    let mut sub = SampleResult::new(url.as_str(), "GET");
                    sub.url = Some(url.clone());
                    sub.fail(&err);
                    sub
                }
            };
            parent.attach_sub_result(sub, self.ignore_failures);
            if index != last {
                std::thread::sleep(self.serial_delay);
            }
        }
    }

    fn fetch_one(&self, url: &Url, ctx: &mut WorkerContext) -> Result<SampleResult, SamplerError> {
        let target = Target::new(url.clone());
        let key = ConnectionKey::new(&target, ctx.config.proxy.as_ref());
        let mut request = HttpRequest::from_target(target, "GET");
        request.set_timeout(ctx.config.timeouts.clone());

        let client = ctx.client_for(&key)?;
        let future = client.send(request)?;
        let started = future.started_at();
        future.wait();

        let mut sub = SampleResult::new(url.as_str(), "GET");
        sub.url = Some(url.clone());
        sub.start = Some(started);
        sub.stamp_end();
        match future.result() {
            Ok(response) => apply_sub_response(&mut sub, response),
            Err(err) => sub.fail(&err),
        }
        Ok(sub)
    }

    /// Every accepted URL gets its own async request at once. Completion
    /// callbacks append sub-results under a shared lock; the calling
    /// thread polls a completion counter until everything landed or the
    /// deadline elapsed, in which case a single synthetic timeout
    /// sub-result is appended and waiting stops. In-flight requests are
    /// not cancelled, they are merely no longer awaited.
    fn download_concurrent(
        &self,
        parent: &mut SampleResult,
        urls: Vec<Url>,
        ctx: &mut WorkerContext,
    ) {
        let deadline = self.deadline.unwrap_or_else(|| {
            ctx.config
                .timeouts
                .response
                .unwrap_or(DEFAULT_FANOUT_DEADLINE)
        });
        let expected = urls.len();
        let collected: Arc<Mutex<Vec<SampleResult>>> = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(AtomicUsize::new(0));

        let mut futures = Vec::with_capacity(expected);
        for url in urls {
            let target = Target::new(url.clone());
            let key = ConnectionKey::new(&target, ctx.config.proxy.as_ref());
            let mut request = HttpRequest::from_target(target, "GET");
            request.set_timeout(ctx.config.timeouts.clone());

            let sent = ctx
                .client_for(&key)
                .and_then(|client| client.send(request));
            match sent {
                Ok(future) => {
                    let collected = collected.clone();
                    let completed = completed.clone();
                    let started = future.started_at();
                    let sub_url = url.clone();
                    future.on_complete(Box::new(move |outcome| {
                        let sub = outcome_sub_result(&sub_url, started, outcome);
                        collected.lock().unwrap().push(sub);
                        completed.fetch_add(1, Ordering::AcqRel);
                    }));
                    futures.push(future);
                }
                Err(err) => {
                    let mut sub = SampleResult::new(url.as_str(), "GET");
                    sub.url = Some(url.clone());
                    sub.fail(&err);
                    collected.lock().unwrap().push(sub);
                    completed.fetch_add(1, Ordering::AcqRel);
                }
            }
        }

        let limit = Instant::now() + deadline;
        while completed.load(Ordering::Acquire) < expected {
            if Instant::now() >= limit {
                warn!(
                    expected,
                    landed = completed.load(Ordering::Acquire),
                    "embedded download deadline elapsed"
                );
                let mut sub = SampleResult::new("embedded downloads", "GET");
                sub.fail(&SamplerError::ExecutionTimeout);
                collected.lock().unwrap().push(sub);
                break;
            }
            std::thread::sleep(self.poll_interval);
        }

        let finished = {
            let mut guard = collected.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        for sub in finished {
            parent.attach_sub_result(sub, self.ignore_failures);
        }
    }
}

fn compile_pattern(pattern: &str, role: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(role, pattern, error = %err, "malformed resource filter pattern, ignoring it");
            None
        }
    }
}

fn outcome_sub_result(url: &Url, started: DateTime<Utc>, outcome: &RequestOutcome) -> SampleResult {
    let mut sub = SampleResult::new(url.as_str(), "GET");
    sub.url = Some(url.clone());
    sub.start = Some(started);
    sub.stamp_end();
    match outcome {
        RequestOutcome::Success(response) => apply_sub_response(&mut sub, response.clone()),
        RequestOutcome::Failure {
            error,
            partial: Some(response),
        } => {
            warn!(url = %url, error = %error, "embedded download failed after response delivery, keeping the response");
            apply_sub_response(&mut sub, response.clone());
        }
        RequestOutcome::Failure {
            error,
            partial: None,
        } => sub.fail(error),
    }
    sub
}

fn apply_sub_response(sub: &mut SampleResult, response: HttpResponse) {
    sub.response_code = response.status.to_string();
    sub.response_message = response.status_message.clone();
    sub.successful = SampleResult::status_is_success(response.status);
    sub.header_size = header_block_size(&response.headers);
    sub.content_type = response.content_type().map(|value| value.to_string());
    sub.connect_time = response.timings.connect_end;
    sub.latency = response.timings.latency_end;
    sub.headers = response.headers;
    sub.body = response.body;
}

static RESOURCE_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:src|href)\s*=\s*["']([^"']+)["']"#).expect("attribute pattern")
});

/// Pull candidate resource URLs out of an HTML body: src and href
/// attribute values resolved against the page URL.
pub fn extract_resource_urls(base: &Url, body: &str) -> Vec<Url> {
    let mut urls = Vec::new();
    for capture in RESOURCE_ATTRIBUTE.captures_iter(body) {
        let raw = &capture[1];
        match base.join(raw) {
            Ok(url) => urls.push(url),
            Err(err) => debug!(raw, error = %err, "skipping unresolvable resource URL"),
        }
    }
    urls
}
