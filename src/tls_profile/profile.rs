//! TLS security profile resource and the built-in profile table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default resource name of the TLS profile selector.
pub const TLS_PROFILE_RESOURCE_NAME: &str = "config";

/// The cluster configuration object carrying the TLS profile selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdiConfig {
    /// Desired state.
    #[serde(default)]
    pub spec: CdiConfigSpec,
}

/// Spec of [`CdiConfig`]; only the TLS selector is relevant here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdiConfigSpec {
    /// Selected TLS security profile; `None` means the default profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_security_profile: Option<TlsSecurityProfile>,
}

/// TLS security profile selector as written by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSecurityProfile {
    /// Profile type name: `Old`, `Intermediate`, `Modern` or `Custom`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub profile_type: Option<String>,

    /// Explicit settings, consulted only for the `Custom` type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomTlsProfile>,
}

impl TlsSecurityProfile {
    /// A selector naming one of the built-in profiles.
    #[must_use]
    pub fn of_type(profile_type: TlsProfileType) -> Self {
        Self {
            profile_type: Some(profile_type.as_str().to_owned()),
            custom: None,
        }
    }

    /// A `Custom` selector.
    #[must_use]
    pub fn custom(min_tls_version: &str, ciphers: &[&str]) -> Self {
        Self {
            profile_type: Some(TlsProfileType::Custom.as_str().to_owned()),
            custom: Some(CustomTlsProfile {
                ciphers: ciphers.iter().map(|&c| c.to_owned()).collect(),
                min_tls_version: min_tls_version.to_owned(),
            }),
        }
    }
}

/// Operator-supplied cipher list and minimum version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTlsProfile {
    /// Cipher names, OpenSSL style.
    #[serde(default)]
    pub ciphers: Vec<String>,

    /// Minimum version, e.g. `VersionTLS12`.
    #[serde(rename = "minTLSVersion", default)]
    pub min_tls_version: String,
}

/// Closed set of profile kinds. Anything else resolves to the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TlsProfileType {
    /// Legacy clients: TLS 1.0 and a broad cipher list.
    Old,
    /// The default: TLS 1.2 and AEAD ciphers.
    #[default]
    Intermediate,
    /// TLS 1.3 only.
    Modern,
    /// Explicit cipher list and minimum version.
    Custom,
}

impl TlsProfileType {
    /// Parse a profile type name; unrecognized names give `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Old" => Some(Self::Old),
            "Intermediate" => Some(Self::Intermediate),
            "Modern" => Some(Self::Modern),
            "Custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Canonical type name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Old => "Old",
            Self::Intermediate => "Intermediate",
            Self::Modern => "Modern",
            Self::Custom => "Custom",
        }
    }

    /// Built-in definition, `None` for `Custom`.
    #[must_use]
    pub fn builtin(self) -> Option<&'static ProfileSpec> {
        match self {
            Self::Old => Some(&OLD_PROFILE),
            Self::Intermediate => Some(&INTERMEDIATE_PROFILE),
            Self::Modern => Some(&MODERN_PROFILE),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for TlsProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiable protocol versions, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Oldest version any profile may select.
    pub const OLDEST: Self = Self::Tls10;
    /// Newest supported version.
    pub const NEWEST: Self = Self::Tls13;

    /// Parse a profile version name such as `VersionTLS12`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "VersionTLS10" => Some(Self::Tls10),
            "VersionTLS11" => Some(Self::Tls11),
            "VersionTLS12" => Some(Self::Tls12),
            "VersionTLS13" => Some(Self::Tls13),
            _ => None,
        }
    }

    /// Profile version name.
    #[must_use]
    pub fn as_name(self) -> &'static str {
        match self {
            Self::Tls10 => "VersionTLS10",
            Self::Tls11 => "VersionTLS11",
            Self::Tls12 => "VersionTLS12",
            Self::Tls13 => "VersionTLS13",
        }
    }

    /// Protocol version number as sent on the wire.
    #[must_use]
    pub fn wire_version(self) -> u16 {
        match self {
            Self::Tls10 => 0x0301,
            Self::Tls11 => 0x0302,
            Self::Tls12 => 0x0303,
            Self::Tls13 => 0x0304,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_name())
    }
}

/// Static definition of a built-in profile.
#[derive(Debug)]
pub struct ProfileSpec {
    /// Minimum protocol version.
    pub min_version: TlsVersion,
    /// Cipher names in preference order.
    pub ciphers: &'static [&'static str],
}

/// `Old`: compatible with very old clients.
pub static OLD_PROFILE: ProfileSpec = ProfileSpec {
    min_version: TlsVersion::Tls10,
    ciphers: &[
        "TLS_AES_128_GCM_SHA256",
        "TLS_AES_256_GCM_SHA384",
        "TLS_CHACHA20_POLY1305_SHA256",
        "ECDHE-ECDSA-AES128-GCM-SHA256",
        "ECDHE-RSA-AES128-GCM-SHA256",
        "ECDHE-ECDSA-AES256-GCM-SHA384",
        "ECDHE-RSA-AES256-GCM-SHA384",
        "ECDHE-ECDSA-CHACHA20-POLY1305",
        "ECDHE-RSA-CHACHA20-POLY1305",
        "DHE-RSA-AES128-GCM-SHA256",
        "DHE-RSA-AES256-GCM-SHA384",
        "DHE-RSA-CHACHA20-POLY1305",
        "ECDHE-ECDSA-AES128-SHA256",
        "ECDHE-RSA-AES128-SHA256",
        "ECDHE-ECDSA-AES128-SHA",
        "ECDHE-RSA-AES128-SHA",
        "ECDHE-ECDSA-AES256-SHA384",
        "ECDHE-RSA-AES256-SHA384",
        "ECDHE-ECDSA-AES256-SHA",
        "ECDHE-RSA-AES256-SHA",
        "DHE-RSA-AES128-SHA256",
        "DHE-RSA-AES256-SHA256",
        "AES128-GCM-SHA256",
        "AES256-GCM-SHA384",
        "AES128-SHA256",
        "AES256-SHA256",
        "AES128-SHA",
        "AES256-SHA",
        "DES-CBC3-SHA",
    ],
};

/// `Intermediate`: the default.
pub static INTERMEDIATE_PROFILE: ProfileSpec = ProfileSpec {
    min_version: TlsVersion::Tls12,
    ciphers: &[
        "TLS_AES_128_GCM_SHA256",
        "TLS_AES_256_GCM_SHA384",
        "TLS_CHACHA20_POLY1305_SHA256",
        "ECDHE-ECDSA-AES128-GCM-SHA256",
        "ECDHE-RSA-AES128-GCM-SHA256",
        "ECDHE-ECDSA-AES256-GCM-SHA384",
        "ECDHE-RSA-AES256-GCM-SHA384",
        "ECDHE-ECDSA-CHACHA20-POLY1305",
        "ECDHE-RSA-CHACHA20-POLY1305",
        "DHE-RSA-AES128-GCM-SHA256",
        "DHE-RSA-AES256-GCM-SHA384",
    ],
};

/// `Modern`: TLS 1.3 suites only.
pub static MODERN_PROFILE: ProfileSpec = ProfileSpec {
    min_version: TlsVersion::Tls13,
    ciphers: &[
        "TLS_AES_128_GCM_SHA256",
        "TLS_AES_256_GCM_SHA384",
        "TLS_CHACHA20_POLY1305_SHA256",
    ],
};
