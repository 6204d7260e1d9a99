use crate::types::{ClientTimeouts, Header, ProxyConfig};

/// One request argument from the test plan. `always_encoded` marks values
/// the user entered pre-encoded; those are never URL-decoded before the
/// form body is rebuilt.
#[derive(Debug, Clone)]
pub struct Arg {
    pub name: String,
    pub value: String,
    pub always_encoded: bool,
}

impl Arg {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            always_encoded: false,
        }
    }

    pub fn unnamed(value: impl Into<String>) -> Self {
        Self::new("", value)
    }

    pub fn always_encoded(mut self) -> Self {
        self.always_encoded = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FileArg {
    pub path: String,
    pub param_name: String,
    pub mime_type: Option<String>,
}

impl FileArg {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            param_name: String::new(),
            mime_type: None,
        }
    }

    pub fn param_name(mut self, name: impl Into<String>) -> Self {
        self.param_name = name.into();
        self
    }

    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// Configuration of one logical sampler: the request template executed once
/// per engine iteration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub label: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<Header>,
    pub args: Vec<Arg>,
    pub file_args: Vec<FileArg>,
    /// Send argument values concatenated verbatim as the request body
    /// instead of form-encoding them.
    pub send_parameters_as_body: bool,
    pub timeouts: Option<ClientTimeouts>,
}

impl SamplerConfig {
    pub fn new(label: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            args: Vec::new(),
            file_args: Vec::new(),
            send_parameters_as_body: false,
            timeouts: None,
        }
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn file_arg(mut self, file: FileArg) -> Self {
        self.file_args.push(file);
        self
    }

    pub fn send_parameters_as_body(mut self, raw: bool) -> Self {
        self.send_parameters_as_body = raw;
        self
    }

    pub fn timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
}

/// Connection-level configuration shared by every sampler on a worker.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeouts: ClientTimeouts,
    pub proxy: Option<ProxyConfig>,
    pub preemptive_auth: bool,
    pub max_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeouts: ClientTimeouts::default(),
            proxy: None,
            preemptive_auth: false,
            max_buffer_size: 32 * 1024 * 1024,
        }
    }
}

/// Embedded-resource download configuration.
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Regex a URL must match to be downloaded; empty allows everything.
    pub allow_pattern: String,
    /// Regex that excludes a URL; empty denies nothing.
    pub deny_pattern: String,
    /// Number of parallel downloads; 1 degrades to serial mode.
    pub pool_size: usize,
    pub ignore_embedded_failures: bool,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            allow_pattern: String::new(),
            deny_pattern: String::new(),
            pool_size: 1,
            ignore_embedded_failures: false,
        }
    }
}
