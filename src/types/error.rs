#[derive(Debug)]
pub enum SamplerError {
    ConnectionFailed(String),
    RequestFailed(String),
    InvalidResponse(String),
    Timeout,
    Io(std::io::Error),

    // Sample build errors
    InvalidMethod(String),
    InvalidTarget(String),
    InvalidProxy(String),
    MalformedHeaders(String),
    FileBody(String),

    // Orchestration errors
    Cancelled,
    Interrupted,
    ExecutionTimeout,
}

impl SamplerError {
    /// Short stable identifier used as the response code of error sample
    /// results, so failures can be asserted on without string-matching the
    /// full message.
    pub fn code(&self) -> &'static str {
        match self {
            SamplerError::ConnectionFailed(_) => "Connection Failed",
            SamplerError::RequestFailed(_) => "Request Failed",
            SamplerError::InvalidResponse(_) => "Invalid Response",
            SamplerError::Timeout => "Timeout",
            SamplerError::Io(_) => "IO Error",
            SamplerError::InvalidMethod(_) => "Invalid Method",
            SamplerError::InvalidTarget(_) => "Invalid Target",
            SamplerError::InvalidProxy(_) => "Invalid Proxy",
            SamplerError::MalformedHeaders(_) => "Malformed Headers",
            SamplerError::FileBody(_) => "File Body Error",
            SamplerError::Cancelled => "Cancelled",
            SamplerError::Interrupted => "Interrupted",
            SamplerError::ExecutionTimeout => "Execution Timeout",
        }
    }
}

impl std::fmt::Display for SamplerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplerError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            SamplerError::RequestFailed(msg) => write!(f, "Request failed: {}", msg),
            SamplerError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            SamplerError::Timeout => write!(f, "Request timeout"),
            SamplerError::Io(err) => write!(f, "IO error: {}", err),
            SamplerError::InvalidMethod(msg) => write!(f, "Invalid method: {}", msg),
            SamplerError::InvalidTarget(msg) => write!(f, "Invalid target: {}", msg),
            SamplerError::InvalidProxy(msg) => write!(f, "Invalid proxy: {}", msg),
            SamplerError::MalformedHeaders(msg) => write!(f, "Malformed headers: {}", msg),
            SamplerError::FileBody(msg) => write!(f, "File body error: {}", msg),
            SamplerError::Cancelled => write!(f, "Request cancelled"),
            SamplerError::Interrupted => write!(f, "Worker interrupted"),
            SamplerError::ExecutionTimeout => write!(f, "Execution timeout"),
        }
    }
}

impl std::error::Error for SamplerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SamplerError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SamplerError {
    fn from(err: std::io::Error) -> Self {
        SamplerError::Io(err)
    }
}

impl From<url::ParseError> for SamplerError {
    fn from(err: url::ParseError) -> Self {
        SamplerError::InvalidTarget(err.to_string())
    }
}
