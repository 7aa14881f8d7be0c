//! Visitor identity and path classification.

use sha2::{Digest, Sha256};

/// Derive a stable pseudonymous visitor ID from the user-agent, IP, and
/// process secret.
///
/// Returns the first 16 hex characters of `SHA256(ua || ip || secret)`.
/// Stable for the life of the secret, not reversible, and does not leak
/// the secret.
pub fn generate_visitor_id(user_agent: &str, ip_address: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    hasher.update(ip_address.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// True for paths that serve HTML-like content: `/`, paths ending in
/// `.html`/`.htm`/`/`, and extensionless paths.
pub fn is_html_request(path: &str) -> bool {
    if path == "/" || path.ends_with('/') {
        return true;
    }
    let lower = path.to_lowercase();
    if lower.ends_with(".html") || lower.ends_with(".htm") {
        return true;
    }
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    !last_segment.contains('.')
}

/// True for paths exempt from rate accounting (API and dashboard routes).
pub fn is_excluded_from_rate_limit(path: &str, excluded_prefixes: &[String]) -> bool {
    excluded_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
}
