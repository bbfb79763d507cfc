//! Share tokens and public URLs

use axum::http::HeaderMap;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Path prefix share links are served under
pub const SHARE_PATH: &str = "/s";

/// Produces a share token of the requested length
pub type TokenSource = fn(usize) -> String;

/// Random `[A-Za-z0-9]` token
pub fn generate_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Whether a path segment could be a share token
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && token.len() <= 64 && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Public URL for a token: `{base}/s/{token}`
pub fn share_url(base: &str, token: &str) -> String {
    format!("{}{}/{}", base.trim_end_matches('/'), SHARE_PATH, token)
}

/// Base URL clients reach the service at
///
/// A configured public URL wins; otherwise it is rebuilt from the
/// forwarding headers a proxy sets, then from `Host`.
pub fn base_url(public_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = public_url.map(str::trim).filter(|u| !u.is_empty()) {
        return url.trim_end_matches('/').to_string();
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let proto = header("x-forwarded-proto").unwrap_or("http");
    match header("x-forwarded-host").or_else(|| header("host")) {
        Some(host) => format!("{}://{}", proto, host),
        None => "http://localhost".to_string(),
    }
}
