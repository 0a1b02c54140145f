//! The cluster authentication descriptor.
//!
//! A flat key/value resource (the `extension-apiserver-authentication`
//! ConfigMap in `kube-system`). List-valued keys hold a JSON-ish pseudo-array
//! of quoted strings, e.g. `["X-Remote-User"]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default resource name of the authentication descriptor.
pub const AUTH_DESCRIPTOR_NAME: &str = "extension-apiserver-authentication";

/// PEM bundle of the primary client CA.
pub const CLIENT_CA_KEY: &str = "client-ca-file";
/// PEM bundle of the CA trusted for front-proxy identity headers.
pub const REQUESTHEADER_CLIENT_CA_KEY: &str = "requestheader-client-ca-file";
/// Common names allowed to present front-proxy identity headers.
pub const REQUESTHEADER_ALLOWED_NAMES_KEY: &str = "requestheader-allowed-names";
/// Headers carrying the forwarded user name.
pub const REQUESTHEADER_USERNAME_HEADERS_KEY: &str = "requestheader-username-headers";
/// Headers carrying forwarded group names.
pub const REQUESTHEADER_GROUP_HEADERS_KEY: &str = "requestheader-group-headers";
/// Header prefixes carrying forwarded extra attributes.
pub const REQUESTHEADER_EXTRA_HEADERS_PREFIX_KEY: &str = "requestheader-extra-headers-prefix";

/// Raw authentication descriptor, as stored in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDescriptor {
    /// Key/value payload.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl AuthDescriptor {
    /// Build a descriptor from key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `key`, or `""` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.data.get(key).map_or("", String::as_str)
    }

    /// Value of a list-valued `key`, deserialized.
    #[must_use]
    pub fn get_list(&self, key: &str) -> Vec<String> {
        deserialize_string_slice(self.get(key))
    }
}

/// Deserialize a pseudo-array such as `["a","b"]` into its strings.
///
/// Malformed input degrades instead of failing: non-string and empty entries
/// are dropped, and if the value is not valid JSON the quoted entries that can
/// still be recognized are kept.
#[must_use]
pub fn deserialize_string_slice(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => values
            .into_iter()
            .filter_map(|value| match value {
                serde_json::Value::String(s) if !s.is_empty() => Some(s),
                other => {
                    debug!(entry = %other, "Dropping non-string list entry");
                    None
                }
            })
            .collect(),
        Err(e) => {
            warn!(value = raw, error = %e, "Malformed string list, keeping recognizable entries");
            lenient_split(raw)
        }
    }
}

fn lenient_split(raw: &str) -> Vec<String> {
    let inner = raw.strip_prefix('[').unwrap_or(raw);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    inner
        .split(',')
        .filter_map(|entry| {
            let unquoted = entry.trim().strip_prefix('"')?.strip_suffix('"')?;
            (!unquoted.is_empty() && !unquoted.contains('"')).then(|| unquoted.to_owned())
        })
        .collect()
}
