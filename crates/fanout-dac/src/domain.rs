//! Owner domain derivation
//!
//! The owner of a log is the app that embeds the service, identified by the
//! domain it was loaded from. Portal-hosted apps are served from a subdomain
//! of the portal (`myapp.hns.siasky.net`); the portal suffix is not part of
//! the owner.

use crate::error::DacError;

/// Derive the owner domain from a referrer URL
///
/// Drops the scheme, credentials, port, path, query and fragment, lowercases
/// the host and removes a trailing `.{portal_domain}` when given.
///
/// # Errors
///
/// Returns `InvalidReferrer` when nothing but dots is left, including a
/// referrer that is the portal itself.
pub fn extract_domain(referrer: &str, portal_domain: Option<&str>) -> Result<String, DacError> {
    let rest = referrer.trim();
    let rest = match rest.find("://") {
        Some(i) => &rest[i + 3..],
        None => rest,
    };

    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    let host = strip_suffix(host, ".").to_ascii_lowercase();

    let domain = match portal_domain.map(|p| p.trim_matches('.').to_ascii_lowercase()) {
        Some(portal) if !portal.is_empty() => {
            if host == portal {
                String::new()
            } else {
                strip_suffix(&host, &format!(".{}", portal)).to_string()
            }
        }
        _ => host,
    };

    // A key segment of only dots would climb out of the data domain
    if domain.chars().all(|c| c == '.') {
        return Err(DacError::InvalidReferrer(referrer.to_string()));
    }
    Ok(domain)
}

/// Remove one occurrence of `suffix` from the end of `s`
pub fn strip_suffix<'a>(s: &'a str, suffix: &str) -> &'a str {
    s.strip_suffix(suffix).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_referrers() {
        assert_eq!(extract_domain("https://app.hns/", None).unwrap(), "app.hns");
        assert_eq!(
            extract_domain("http://User@App.HNS:8080/a/b?c=d#e", None).unwrap(),
            "app.hns"
        );
        assert_eq!(extract_domain("app.hns/", None).unwrap(), "app.hns");
    }

    #[test]
    fn test_portal_suffix_is_removed() {
        let portal = Some("siasky.net");
        assert_eq!(
            extract_domain("https://myapp.hns.siasky.net/", portal).unwrap(),
            "myapp.hns"
        );
        // Other hosts are left alone
        assert_eq!(
            extract_domain("https://example.com/", portal).unwrap(),
            "example.com"
        );
    }

    #[test]
    fn test_empty_domains_are_rejected() {
        assert!(matches!(
            extract_domain("", None),
            Err(DacError::InvalidReferrer(_))
        ));
        assert!(extract_domain("https:///path", None).is_err());
        assert!(extract_domain("https://siasky.net/", Some("siasky.net")).is_err());
    }

    #[test]
    fn test_dot_only_domains_are_rejected() {
        assert!(matches!(
            extract_domain("https://../", None),
            Err(DacError::InvalidReferrer(_))
        ));
        assert!(extract_domain("https://.../x", None).is_err());
        assert!(extract_domain("https://..siasky.net/", Some("siasky.net")).is_err());
        assert_eq!(extract_domain("https://a..b/", None).unwrap(), "a..b");
    }

    #[test]
    fn test_strip_suffix_removes_one_occurrence() {
        assert_eq!(strip_suffix("app.hns//", "/"), "app.hns/");
        assert_eq!(strip_suffix("app.hns", "/"), "app.hns");
    }
}
