use crate::types::error::SamplerError;
use url::Url;

/// Outbound proxy identity. Part of the connection key: two samplers
/// pointing at the same authority through different proxies must not share
/// a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn parse(proxy: &str) -> Result<Self, SamplerError> {
        let url = Url::parse(proxy)
            .map_err(|err| SamplerError::InvalidProxy(format!("{} ({})", proxy, err)))?;

        let scheme = url.scheme().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(SamplerError::InvalidProxy(format!(
                "Unsupported proxy scheme '{}'",
                scheme
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| SamplerError::InvalidProxy(format!("Proxy '{}' has no host", proxy)))?
            .to_string();
        let port = url.port_or_known_default().ok_or_else(|| {
            SamplerError::InvalidProxy(format!("Proxy '{}' has no known port", proxy))
        })?;

        let username = match url.username() {
            "" => None,
            name => Some(name.to_string()),
        };
        let password = url.password().map(|value| value.to_string());

        Ok(Self {
            scheme,
            host,
            port,
            username,
            password,
        })
    }
}
