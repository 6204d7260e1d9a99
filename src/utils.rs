use percent_encoding::percent_decode_str;
use url::Url;

use crate::types::{Header, SamplerError, Target};

pub const USER_AGENT: &str = "h2sampler/0.1.0";
pub const HOST_HEADER: &str = "host";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";
pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const COOKIE_HEADER: &str = "cookie";
pub const SET_COOKIE_HEADER: &str = "set-cookie";
pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const USER_AGENT_HEADER: &str = "user-agent";

pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_X_WWW_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

pub fn parse_target(target: &str) -> Result<Target, SamplerError> {
    let url = Url::parse(target)
        .map_err(|e| SamplerError::InvalidTarget(format!("{} ({})", target, e)))?;

    if url.host_str().is_none() {
        return Err(SamplerError::InvalidTarget(format!(
            "Target '{}' is missing a host",
            target
        )));
    }

    if url.port_or_known_default().is_none() {
        return Err(SamplerError::InvalidTarget(format!(
            "Target '{}' has no known port",
            target
        )));
    }

    Ok(Target::new(url))
}

pub fn ensure_user_agent(headers: &mut Vec<Header>) {
    if !headers
        .iter()
        .any(|h| h.name.eq_ignore_ascii_case(USER_AGENT_HEADER))
    {
        headers.push(Header::new(USER_AGENT_HEADER, USER_AGENT));
    }
}

pub fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Decode one application/x-www-form-urlencoded component: '+' becomes a
/// space, percent escapes are resolved.
pub fn decode_form_component(value: &str) -> String {
    let plus_decoded = value.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

/// First name=value pair of a Set-Cookie header, attributes ignored.
pub fn parse_set_cookie(input: &str) -> Option<(String, String)> {
    let mut parts = input.split(';');
    let pair = parts.next()?.trim();
    if pair.is_empty() {
        return None;
    }

    let mut kv = pair.splitn(2, '=');
    let name = kv.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let value = kv.next().unwrap_or("").trim();
    Some((name.to_string(), value.to_string()))
}

/// Best-effort MIME type from a file extension, falling back to an opaque
/// byte stream.
pub fn infer_mime_type(path: &str) -> &'static str {
    let extension = path.rsplit('.').next().unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "png" => "image/png",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => APPLICATION_OCTET_STREAM,
    }
}
