//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Resolve `path` below `base`, treating `base` as a directory.
pub fn endpoint(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path.trim_start_matches('/'))
}

/// Webhook URL safe for logs: the secret token segment is dropped.
pub fn redact_webhook(webhook: &str) -> String {
    match Url::parse(webhook) {
        Ok(url) => {
            let mut segments: Vec<&str> = url
                .path_segments()
                .map(|s| s.collect())
                .unwrap_or_default();
            if segments.len() > 1 {
                segments.pop();
                segments.push("***");
            }
            format!(
                "{}://{}/{}",
                url.scheme(),
                url.host_str().unwrap_or_default(),
                segments.join("/")
            )
        }
        Err(_) => "<invalid webhook>".to_string(),
    }
}
