//! Names for generated cluster objects.

/// Sanitize name for K8s (lowercase, alphanumeric, dashes, max 50 chars)
pub fn sanitize_k8s_name(s: &str) -> String {
    let sanitized: String = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let trimmed = sanitized.trim_matches('-');
    if trimmed.len() > 50 {
        trimmed[..50].trim_end_matches('-').to_string()
    } else {
        trimmed.to_string()
    }
}

/// Namespace for one spec run: `e2e-tests-<base>-<suffix>`
pub fn namespace_name(base_name: &str) -> String {
    let suffix: String = (0..5)
        .map(|_| fastrand::alphanumeric())
        .collect::<String>()
        .to_lowercase();
    format!("e2e-tests-{}-{}", sanitize_k8s_name(base_name), suffix)
}
