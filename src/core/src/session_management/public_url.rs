use uuid::Uuid;

/// Path segment the public output root is mounted at.
pub const PUBLIC_MOUNT: &str = "served_outputs";

/// Picks the base URL for result links.
///
/// A configured base always wins. Otherwise the base is rebuilt from the
/// inbound request's `Host` header and, when a proxy sets it,
/// `X-Forwarded-Proto`. `fallback` is used when the request carries no
/// usable host.
pub fn resolve_base_url(
    configured: Option<&str>,
    host: Option<&str>,
    forwarded_proto: Option<&str>,
    fallback: &str,
) -> String {
    if let Some(base) = configured.map(str::trim).filter(|b| !b.is_empty()) {
        return base.trim_end_matches('/').to_string();
    }

    let host = host
        .map(str::trim)
        .filter(|h| !h.is_empty() && !h.contains(|c: char| c == '/' || c.is_whitespace()));
    match host {
        Some(host) => {
            let scheme = forwarded_proto
                .and_then(|p| p.split(',').next())
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| p == "http" || p == "https")
                .unwrap_or_else(|| "http".to_string());
            format!("{}://{}", scheme, host)
        }
        None => fallback.trim_end_matches('/').to_string(),
    }
}

/// Absolute URL of `file_name` in the public directory of `session_id`.
pub fn artifact_url(base: &str, session_id: Uuid, file_name: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        base.trim_end_matches('/'),
        PUBLIC_MOUNT,
        session_id,
        file_name
    )
}
