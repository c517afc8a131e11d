/// Domain classification: URL -> grouping key and display label
use crate::config::ConfigSnapshot;
use crate::reference::{ReferenceData, TldList};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("IPv4 pattern is valid"));

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("hostname pattern is valid")
});

/// Browser-internal schemes; their pages group only through the alias table
const INTERNAL_SCHEMES: [&str; 3] = ["chrome", "edge", "about"];

const NEWTAB_HOST: &str = "newtab";

/// The result of classifying one tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Tabs sharing a key share a group
    pub key: String,
    /// Group title shown to the user: the key with any known TLD stripped
    pub label: String,
}

/// Classify a tab URL; `None` leaves the tab out of grouping.
///
/// Order of precedence:
/// 1. Pages without a host and unaliased internal pages are excluded
/// 2. The base key is the IPv4 literal, the full host (subdomains on), or the last two labels
/// 3. Whitelisted base keys are excluded (exact, then substring either way)
/// 4. Extension pages use the extension name or id; internal pages use their alias
/// 5. A custom group name for the base key overrides the label from 2-4
/// 6. The display label drops a known TLD; the key keeps it
pub fn classify(url: &Url, config: &ConfigSnapshot, reference: &ReferenceData) -> Option<Classification> {
    let host = url.host_str().unwrap_or("").to_lowercase();
    if host.is_empty() {
        return None;
    }

    let scheme = url.scheme();
    let base_key = base_domain(&host, config.settings.subdomain_enabled);

    if config.is_whitelisted(&base_key) {
        return None;
    }

    let mut key = if scheme.contains("extension") {
        if config.is_extension_whitelisted(&host) {
            return None;
        }
        config.extension_label(&host)
    } else if INTERNAL_SCHEMES.contains(&scheme) {
        internal_page_label(url, &host, config, reference)?
    } else {
        base_key.clone()
    };

    if let Some(custom) = config.custom_label(&base_key) {
        key = custom.to_string();
    }

    let label = strip_tld(&key, &reference.tlds);
    Some(Classification { key, label })
}

/// Parse and classify a raw URL string
pub fn classify_str(
    url: &str,
    config: &ConfigSnapshot,
    reference: &ReferenceData,
) -> Result<Option<Classification>, url::ParseError> {
    let parsed = Url::parse(url.trim())?;
    Ok(classify(&parsed, config, reference))
}

fn internal_page_label(url: &Url, host: &str, config: &ConfigSnapshot, reference: &ReferenceData) -> Option<String> {
    let is_newtab = host == NEWTAB_HOST;
    if is_newtab
        && (!config.settings.enable_newtab_grouping || config.is_extension_whitelisted(NEWTAB_HOST))
    {
        return None;
    }

    let target = format!("{}://{}{}", url.scheme(), host, url.path());
    match reference.aliases.lookup(&target) {
        Some(name) => Some(name.to_string()),
        None if is_newtab => Some(host.to_string()),
        None => None,
    }
}

/// Reduce a hostname to its grouping base.
///
/// IPv4 literals are kept verbatim. With subdomains enabled the full host is
/// used; otherwise the last two labels approximate the registrable domain.
///
/// Examples:
/// - ai.microsoft.com → microsoft.com
/// - ai.microsoft.com (subdomains on) → ai.microsoft.com
/// - 192.168.1.1 → 192.168.1.1
pub fn base_domain(hostname: &str, include_subdomains: bool) -> String {
    if include_subdomains || is_ipv4(hostname) {
        return hostname.to_string();
    }

    let parts: Vec<&str> = hostname.split('.').collect();
    if parts.len() < 2 {
        return hostname.to_string();
    }
    parts[parts.len() - 2..].join(".")
}

/// Check if a string is a dotted-quad IPv4 literal
pub fn is_ipv4(s: &str) -> bool {
    IPV4.is_match(s)
}

pub fn is_valid_hostname(s: &str) -> bool {
    HOSTNAME.is_match(s)
}

/// Extract a hostname from user input that may be a bare host or a full URL
///
/// Returns `None` unless the result is an IPv4 literal or a syntactically
/// valid hostname.
pub fn extract_hostname(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{}", input)
    };

    let hostname = Url::parse(&with_scheme)
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| input.to_lowercase());

    if is_ipv4(&hostname) || is_valid_hostname(&hostname) {
        Some(hostname)
    } else {
        None
    }
}

/// Canonical form of a stored domain or alias target: trimmed, lowercase,
/// without trailing slashes
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('/').to_lowercase()
}

/// Drop a trailing known TLD for display
///
/// A leading `http(s)://` and `www.` are ignored when splitting. Strings
/// with a single label, or whose last label is not a known TLD, come back
/// unchanged.
pub fn strip_tld(label: &str, tlds: &TldList) -> String {
    let clean = label
        .strip_prefix("https://")
        .or_else(|| label.strip_prefix("http://"))
        .unwrap_or(label);
    let clean = clean.strip_prefix("www.").unwrap_or(clean);

    let parts: Vec<&str> = clean.split('.').collect();
    if parts.len() == 1 {
        return label.to_string();
    }

    if tlds.contains(parts[parts.len() - 1]) {
        parts[..parts.len() - 1].join(".")
    } else {
        label.to_string()
    }
}
