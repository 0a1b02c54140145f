//! Front-proxy identity forwarded in request headers.
//!
//! An authenticating proxy in front of the API server forwards the end user's
//! identity in headers named by the authentication descriptor. Those headers
//! are only trusted when the proxy's own client certificate carries an
//! allowed common name.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use serde::Serialize;
use tracing::debug;

use super::config::AuthConfig;

/// Identity asserted by a trusted front proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwardedUser {
    /// User name.
    pub name: String,
    /// Group memberships, in header order.
    pub groups: Vec<String>,
    /// Extra attributes keyed by the lower-cased header suffix.
    pub extra: BTreeMap<String, Vec<String>>,
}

/// Extract the forwarded identity from `headers`.
///
/// Returns `None` when the peer presented no common name, when that name is
/// not allowed by `config`, or when no user header carries a value.
#[must_use]
pub fn authenticate(
    headers: &HeaderMap,
    config: &AuthConfig,
    peer_common_name: Option<&str>,
) -> Option<ForwardedUser> {
    let cn = peer_common_name?;
    if !config.validate_name(cn) {
        debug!(common_name = cn, "Peer not allowed to forward identity headers");
        return None;
    }

    let name = config
        .user_headers
        .iter()
        .filter_map(|h| headers.get(h.as_str()))
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .find(|v| !v.is_empty())?
        .to_owned();

    let groups = config
        .group_headers
        .iter()
        .flat_map(|h| headers.get_all(h.as_str()))
        .filter_map(|v| v.to_str().ok())
        .map(str::to_owned)
        .collect();

    let prefixes: Vec<String> = config
        .extra_prefix_headers
        .iter()
        .map(|p| p.to_ascii_lowercase())
        .collect();
    let mut extra: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (header, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        for prefix in &prefixes {
            if let Some(key) = header.as_str().strip_prefix(prefix.as_str()) {
                if !key.is_empty() {
                    extra.entry(key.to_owned()).or_default().push(value.to_owned());
                }
            }
        }
    }

    Some(ForwardedUser {
        name,
        groups,
        extra,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::descriptor::{
        AuthDescriptor, REQUESTHEADER_ALLOWED_NAMES_KEY, REQUESTHEADER_EXTRA_HEADERS_PREFIX_KEY,
        REQUESTHEADER_GROUP_HEADERS_KEY, REQUESTHEADER_USERNAME_HEADERS_KEY,
    };

    fn config(allowed: &str) -> AuthConfig {
        AuthConfig::from_descriptor(&AuthDescriptor::from_pairs([
            (REQUESTHEADER_ALLOWED_NAMES_KEY, allowed),
            (REQUESTHEADER_USERNAME_HEADERS_KEY, r#"["X-Remote-User"]"#),
            (REQUESTHEADER_GROUP_HEADERS_KEY, r#"["X-Remote-Group"]"#),
            (REQUESTHEADER_EXTRA_HEADERS_PREFIX_KEY, r#"["X-Remote-Extra-"]"#),
        ]))
        .unwrap()
    }

    fn proxy_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-remote-user", "alice".parse().unwrap());
        headers.append("x-remote-group", "system:authenticated".parse().unwrap());
        headers.append("x-remote-group", "admins".parse().unwrap());
        headers.insert("x-remote-extra-scopes", "read".parse().unwrap());
        headers
    }

    #[test]
    fn trusted_proxy_forwards_identity() {
        let user = authenticate(
            &proxy_headers(),
            &config(r#"["front-proxy-client"]"#),
            Some("front-proxy-client"),
        )
        .unwrap();

        assert_eq!(user.name, "alice");
        assert_eq!(user.groups, vec!["system:authenticated", "admins"]);
        assert_eq!(user.extra.get("scopes"), Some(&vec!["read".to_string()]));
    }

    #[test]
    fn untrusted_common_name_is_ignored() {
        let user = authenticate(
            &proxy_headers(),
            &config(r#"["front-proxy-client"]"#),
            Some("other"),
        );
        assert!(user.is_none());
    }

    #[test]
    fn missing_peer_name_is_ignored() {
        assert!(authenticate(&proxy_headers(), &config("[]"), None).is_none());
    }

    #[test]
    fn empty_allowed_names_trusts_any_verified_peer() {
        let user = authenticate(&proxy_headers(), &config("[]"), Some("whoever")).unwrap();
        assert_eq!(user.name, "alice");
    }

    #[test]
    fn no_user_header_means_no_forwarded_identity() {
        let mut headers = proxy_headers();
        headers.remove("x-remote-user");
        assert!(authenticate(&headers, &config("[]"), Some("p")).is_none());
    }
}
