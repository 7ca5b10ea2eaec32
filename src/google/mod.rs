//! Shared plumbing for Google Cloud REST APIs (Cloud Storage and Firestore).

pub mod auth;

pub use auth::{AuthError, TokenSource};

/// OAuth scope granting access to Cloud Storage and Firestore.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Emulator hosts are given as `host:port`; prefix a scheme when one is missing.
pub(crate) fn emulator_base_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", host.trim_end_matches('/'))
    }
}
