use bytes::Bytes;
use chrono::Utc;
use tracing::debug;
use url::form_urlencoded;

use crate::config::SamplerConfig;
use crate::future::ResponseFuture;
use crate::managers::CachedResourcePolicy;
use crate::registry::{ConnectionKey, WorkerContext};
use crate::types::{
    header_block_size, Header, HttpRequest, HttpResponse, SampleResult, SamplerError,
};
use crate::utils::{
    decode_form_component, default_port, ensure_user_agent, infer_mime_type,
    APPLICATION_OCTET_STREAM, APPLICATION_X_WWW_FORM_URLENCODED, AUTHORIZATION_HEADER,
    CONTENT_LENGTH_HEADER, CONTENT_TYPE_HEADER, COOKIE_HEADER, HOST_HEADER, SET_COOKIE_HEADER,
};

const SUPPORTED_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "TRACE", "CONNECT",
];

/// Methods whose parameters always travel in the query string.
fn is_query_only_method(method: &str) -> bool {
    matches!(method, "GET" | "HEAD" | "OPTIONS" | "TRACE" | "CONNECT")
}

struct PendingSample {
    future: ResponseFuture,
    skeleton: SampleResult,
}

/// Deferred outcome of the asynchronous first call. Even build failures
/// and cached-resource synthesis are stashed here, so the first call
/// uniformly answers "no result yet" and the scheduler's resolve call is
/// the only producer of results.
enum Pending {
    InFlight(PendingSample),
    Ready(Option<SampleResult>),
}

/// Executes one logical sample: builds the request from the sampler
/// configuration, sends it synchronously or through the two-call
/// asynchronous protocol, and translates the network outcome into a
/// [`SampleResult`].
///
/// Async state machine per iteration: IDLE -> ASYNC_PENDING on the first
/// call (fire), back to IDLE on the second (resolve). `iteration_start`
/// forces IDLE unconditionally.
pub struct HttpSampler {
    config: SamplerConfig,
    async_mode: bool,
    pending: Option<Pending>,
}

impl HttpSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            async_mode: false,
            pending: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn set_async_mode(&mut self, async_mode: bool) {
        self.async_mode = async_mode;
    }

    pub fn is_async(&self) -> bool {
        self.async_mode
    }

    /// Detach any stale future. Must run at the start of every engine
    /// iteration of the owning element.
    pub fn iteration_start(&mut self) {
        self.pending = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// True when the attached request, if any, reached a terminal state.
    /// Never blocks; this is what the scheduler checkpoint polls.
    pub fn pending_done(&self) -> bool {
        match &self.pending {
            Some(Pending::InFlight(pending)) => pending.future.is_done(),
            Some(Pending::Ready(_)) | None => true,
        }
    }

    /// Cancel the attached request, if any.
    pub fn cancel_pending(&self) -> bool {
        match &self.pending {
            Some(Pending::InFlight(pending)) => pending.future.cancel(),
            _ => false,
        }
    }

    /// Run one sample according to the current mode. `None` means "no
    /// result yet" (async fire) or a suppressed cached resource.
    pub fn sample(&mut self, ctx: &mut WorkerContext) -> Option<SampleResult> {
        if self.async_mode {
            self.sample_async(ctx)
        } else {
            self.sample_sync(ctx)
        }
    }

    /// Synchronous execution: build, send, block, translate. Build and
    /// transport errors become error results with valid timestamps.
    pub fn sample_sync(&mut self, ctx: &mut WorkerContext) -> Option<SampleResult> {
        match self.issue(ctx) {
            Ok(Fired::InFlight(pending)) => {
                pending.future.wait();
                Some(Self::materialize(ctx, pending))
            }
            Ok(Fired::Synthesized(result)) => result,
            Err(err) => Some(SampleResult::error(
                &self.config.label,
                &self.config.method,
                &err,
            )),
        }
    }

    /// Two-call asynchronous protocol. First call fires the request and
    /// returns `None`; the second call resolves the attached future,
    /// detaches it and returns the completed result.
    pub fn sample_async(&mut self, ctx: &mut WorkerContext) -> Option<SampleResult> {
        if let Some(pending) = self.pending.take() {
            return match pending {
                Pending::InFlight(pending) => {
                    pending.future.wait();
                    Some(Self::materialize(ctx, pending))
                }
                Pending::Ready(result) => result,
            };
        }

        let stash = match self.issue(ctx) {
            Ok(Fired::InFlight(pending)) => Pending::InFlight(pending),
            Ok(Fired::Synthesized(result)) => Pending::Ready(result),
            Err(err) => Pending::Ready(Some(SampleResult::error(
                &self.config.label,
                &self.config.method,
                &err,
            ))),
        };
        self.pending = Some(stash);
        None
    }

    fn issue(&mut self, ctx: &mut WorkerContext) -> Result<Fired, SamplerError> {
        let mut request = self.build_request(ctx)?;

        if let Some(cache) = ctx.cache.clone() {
            let url = request.target.url.clone();
            if cache.is_cached(&url, &request.headers) {
                debug!(target = %request.target, "resource cached, not sampling");
                return Ok(Fired::Synthesized(self.synthesize_cached(
                    &request,
                    cache.cached_policy(),
                    cache.synthesized_status(),
                )));
            }
            cache.apply_conditional_headers(&url, &mut request);
        }

        let key = ConnectionKey::new(&request.target, ctx.config.proxy.as_ref());
        let mut skeleton = SampleResult::new(&self.config.label, &request.method);
        skeleton.url = Some(request.target.url.clone());

        let client = ctx.client_for(&key)?;
        let future = client.send(request)?;
        skeleton.start = Some(future.started_at());

        Ok(Fired::InFlight(PendingSample { future, skeleton }))
    }

    fn synthesize_cached(
        &self,
        request: &HttpRequest,
        policy: CachedResourcePolicy,
        configured: (String, String),
    ) -> Option<SampleResult> {
        match policy {
            CachedResourcePolicy::Suppress => None,
            CachedResourcePolicy::SynthesizeOk => {
                let mut result = SampleResult::new(&self.config.label, &request.method);
                result.url = Some(request.target.url.clone());
                result.response_code = "200".to_string();
                result.response_message = "(ex cache)".to_string();
                result.successful = true;
                result.stamp_start();
                result.stamp_end();
                Some(result)
            }
            CachedResourcePolicy::Synthesize => {
                let (code, message) = configured;
                let mut result = SampleResult::new(&self.config.label, &request.method);
                result.url = Some(request.target.url.clone());
                result.successful = true;
                result.response_code = code;
                result.response_message = message;
                result.stamp_start();
                result.stamp_end();
                Some(result)
            }
        }
    }

    /// Turn a terminal future into the final result. The coexistence rule
    /// lives in [`ResponseFuture::result`]: a failure that still delivered
    /// a response yields the response.
    fn materialize(ctx: &WorkerContext, pending: PendingSample) -> SampleResult {
        let PendingSample { future, skeleton } = pending;
        let mut result = skeleton;
        result.start = Some(future.started_at());
        result.end = future.ended_at().or_else(|| Some(Utc::now()));

        match future.result() {
            Ok(response) => Self::apply_response(ctx, &mut result, response),
            Err(err) => {
                result.response_code = err.code().to_string();
                result.response_message = err.to_string();
                result.successful = false;
            }
        }
        result
    }

    fn apply_response(ctx: &WorkerContext, result: &mut SampleResult, response: HttpResponse) {
        result.response_code = response.status.to_string();
        result.response_message = if response.status_message.is_empty() {
            default_status_message(response.status).to_string()
        } else {
            response.status_message.clone()
        };
        result.successful = SampleResult::status_is_success(response.status);
        result.header_size = header_block_size(&response.headers);
        result.content_type = response.content_type().map(|value| value.to_string());
        result.connect_time = response.timings.connect_end;
        result.latency = response.timings.latency_end;

        if let (Some(jar), Some(url)) = (&ctx.cookies, &result.url) {
            for header in &response.headers {
                if header.name.eq_ignore_ascii_case(SET_COOKIE_HEADER) {
                    jar.ingest(&header.value, url);
                }
            }
        }
        if let Some(cache) = &ctx.cache {
            cache.record_response(&response, result);
        }

        result.headers = response.headers;
        result.body = response.body;
    }

    /// Build the outgoing request: URL plus query parameters, body per the
    /// argument rules, header precedence, cookies, preemptive auth.
    fn build_request(&self, ctx: &WorkerContext) -> Result<HttpRequest, SamplerError> {
        let method = self.config.method.to_ascii_uppercase();
        if !SUPPORTED_METHODS.contains(&method.as_str()) {
            return Err(SamplerError::InvalidMethod(self.config.method.clone()));
        }

        let mut request = HttpRequest::new(&self.config.url, method.clone())?;
        request.headers = self.config.headers.clone();

        // The transport computes Content-Length itself.
        request.remove_header(CONTENT_LENGTH_HEADER);

        self.apply_body(&mut request, &method)?;
        self.apply_host_header(&mut request)?;

        if !request.has_header(COOKIE_HEADER) {
            if let Some(jar) = &ctx.cookies {
                if let Some(value) = jar.cookie_header_for(&request.target.url) {
                    request.push_header(Header::new(COOKIE_HEADER, value));
                }
            }
        }

        if ctx.config.preemptive_auth && !request.has_header(AUTHORIZATION_HEADER) {
            if let Some(auth) = &ctx.auth {
                if let Some(credential) = auth.credential_for(&request.target.url) {
                    if let Some(value) = credential.authorization_value() {
                        request.push_header(Header::new(AUTHORIZATION_HEADER, value));
                    }
                }
            }
        }

        ensure_user_agent(&mut request.headers);

        request.set_timeout(
            self.config
                .timeouts
                .clone()
                .unwrap_or_else(|| ctx.config.timeouts.clone()),
        );

        Ok(request)
    }

    fn apply_body(&self, request: &mut HttpRequest, method: &str) -> Result<(), SamplerError> {
        let files = &self.config.file_args;
        let args = &self.config.args;

        // Single unnamed file, no other arguments: the file is the body.
        if files.len() == 1 && files[0].param_name.is_empty() && args.is_empty() {
            let file = &files[0];
            let bytes = std::fs::read(&file.path)
                .map_err(|err| SamplerError::FileBody(format!("{} ({})", file.path, err)))?;
            let mime = file
                .mime_type
                .clone()
                .unwrap_or_else(|| infer_mime_type(&file.path).to_string());
            if !request.has_header(CONTENT_TYPE_HEADER) {
                request.push_header(Header::new(CONTENT_TYPE_HEADER, mime));
            }
            request.set_body(Bytes::from(bytes));
            return Ok(());
        }

        if args.is_empty() {
            return Ok(());
        }

        if self.config.send_parameters_as_body && !is_query_only_method(method) {
            // Encoded argument values concatenated verbatim.
            let mut body = String::new();
            for arg in args {
                body.push_str(&arg.value);
            }
            if !request.has_header(CONTENT_TYPE_HEADER) {
                request.push_header(Header::new(CONTENT_TYPE_HEADER, APPLICATION_OCTET_STREAM));
            }
            request.set_body(body);
            return Ok(());
        }

        let encoded = encode_form_args(args);
        if is_query_only_method(method) {
            append_query(request, &encoded);
        } else {
            if !request.has_header(CONTENT_TYPE_HEADER) {
                request.push_header(Header::new(
                    CONTENT_TYPE_HEADER,
                    APPLICATION_X_WWW_FORM_URLENCODED,
                ));
            }
            request.set_body(encoded);
        }
        Ok(())
    }

    /// An explicit Host header overrides the URL's host but keeps the URL's
    /// port unless the header carries its own; the port is dropped when it
    /// equals the scheme default.
    fn apply_host_header(&self, request: &mut HttpRequest) -> Result<(), SamplerError> {
        let header_value = match request.header_value(HOST_HEADER) {
            Some(value) => value.trim().to_string(),
            None => return Ok(()),
        };
        if header_value.is_empty() {
            request.remove_header(HOST_HEADER);
            return Ok(());
        }

        let (host, header_port) = match header_value.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| SamplerError::MalformedHeaders(header_value.clone()))?;
                (host.to_string(), Some(port))
            }
            _ => (header_value.clone(), None),
        };

        let port = header_port.or_else(|| request.target.url.port_or_known_default());
        let authority = match port {
            Some(port) if Some(port) != default_port(request.target.scheme()) => {
                format!("{}:{}", host, port)
            }
            _ => host,
        };

        request.remove_header(HOST_HEADER);
        request.push_header(Header::new(HOST_HEADER, authority));
        Ok(())
    }
}

enum Fired {
    InFlight(PendingSample),
    Synthesized(Option<SampleResult>),
}

/// Re-encode arguments as a form-encoded string. Values not marked
/// always-encoded are URL-decoded first so user input is never encoded
/// twice; always-encoded pairs pass through verbatim.
fn encode_form_args(args: &[crate::config::Arg]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(args.len());
    for arg in args {
        if arg.always_encoded {
            if arg.name.is_empty() {
                parts.push(arg.value.clone());
            } else {
                parts.push(format!("{}={}", arg.name, arg.value));
            }
            continue;
        }
        let name = decode_form_component(&arg.name);
        let value = decode_form_component(&arg.value);
        let encoded_value: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
        if name.is_empty() {
            parts.push(encoded_value);
        } else {
            let encoded_name: String = form_urlencoded::byte_serialize(name.as_bytes()).collect();
            parts.push(format!("{}={}", encoded_name, encoded_value));
        }
    }
    parts.join("&")
}

fn append_query(request: &mut HttpRequest, encoded: &str) {
    if encoded.is_empty() {
        return;
    }
    let merged = match request.target.url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
        _ => encoded.to_string(),
    };
    request.target.url.set_query(Some(&merged));
}

fn default_status_message(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}
