//! Resolved TLS policy.

use rustls::CipherSuite;
use tracing::{debug, warn};

use super::ciphers::cipher_suite_ids;
use super::profile::{CdiConfig, CustomTlsProfile, TlsProfileType, TlsSecurityProfile, TlsVersion};

/// Minimum version and permitted ciphers for new handshakes.
///
/// Always has a minimum version and at least one cipher suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    /// Profile this policy was derived from.
    pub profile: TlsProfileType,
    /// Minimum negotiated protocol version.
    pub min_version: TlsVersion,
    /// Permitted cipher suites, in preference order.
    pub cipher_suites: Vec<CipherSuite>,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self::builtin(TlsProfileType::Intermediate)
    }
}

impl TlsPolicy {
    /// The `Intermediate` policy.
    #[must_use]
    pub fn intermediate() -> Self {
        Self::default()
    }

    /// Policy of a built-in profile. `Custom` yields the default.
    #[must_use]
    pub fn builtin(profile: TlsProfileType) -> Self {
        let (profile, spec) = match profile.builtin() {
            Some(spec) => (profile, spec),
            None => (TlsProfileType::Intermediate, &super::profile::INTERMEDIATE_PROFILE),
        };
        Self {
            profile,
            min_version: spec.min_version,
            cipher_suites: cipher_suite_ids(spec.ciphers),
        }
    }

    /// Resolve the selector of a configuration object; absent object or
    /// selector resolves to the default.
    #[must_use]
    pub fn from_resource(resource: Option<&CdiConfig>) -> Self {
        Self::from_profile(resource.and_then(|r| r.spec.tls_security_profile.as_ref()))
    }

    /// Resolve a selector. Never fails: anything unusable becomes the default.
    #[must_use]
    pub fn from_profile(profile: Option<&TlsSecurityProfile>) -> Self {
        let Some(name) = profile.and_then(|p| p.profile_type.as_deref()) else {
            debug!("No TLS profile selected, using Intermediate");
            return Self::default();
        };

        let Some(kind) = TlsProfileType::from_name(name) else {
            warn!(profile = name, "Unrecognized TLS profile type, using Intermediate");
            return Self::default();
        };

        if kind != TlsProfileType::Custom {
            return Self::builtin(kind);
        }

        match Self::custom(profile.and_then(|p| p.custom.as_ref())) {
            Ok(policy) => policy,
            Err(reason) => {
                warn!(reason, "Unusable custom TLS profile, using Intermediate");
                Self::default()
            }
        }
    }

    fn custom(custom: Option<&CustomTlsProfile>) -> Result<Self, &'static str> {
        let custom = custom.ok_or("custom profile settings missing")?;
        let min_version = TlsVersion::from_name(&custom.min_tls_version)
            .ok_or("unrecognized minTLSVersion")?;
        let cipher_suites = cipher_suite_ids(&custom.ciphers);
        if cipher_suites.is_empty() {
            return Err("no known cipher suites");
        }
        Ok(Self {
            profile: TlsProfileType::Custom,
            min_version,
            cipher_suites,
        })
    }
}
