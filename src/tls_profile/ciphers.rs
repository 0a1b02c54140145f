//! Cipher suite name → wire identifier mapping.
//!
//! Profiles list ciphers by OpenSSL name (`ECDHE-RSA-AES128-GCM-SHA256`);
//! TLS 1.3 suites use their IANA name (`TLS_AES_128_GCM_SHA256`). IANA names
//! of the TLS 1.2 suites are accepted as well. Finite-field DHE suites are not
//! listed since the TLS stack does not implement them; they resolve as unknown
//! and are skipped.

use rustls::CipherSuite;
use tracing::warn;

/// (OpenSSL name, IANA name, wire identifier)
const CIPHER_TABLE: &[(&str, &str, u16)] = &[
    // TLS 1.3
    ("TLS_AES_128_GCM_SHA256", "TLS_AES_128_GCM_SHA256", 0x1301),
    ("TLS_AES_256_GCM_SHA384", "TLS_AES_256_GCM_SHA384", 0x1302),
    ("TLS_CHACHA20_POLY1305_SHA256", "TLS_CHACHA20_POLY1305_SHA256", 0x1303),
    // ECDHE AEAD
    ("ECDHE-ECDSA-AES128-GCM-SHA256", "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", 0xc02b),
    ("ECDHE-RSA-AES128-GCM-SHA256", "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", 0xc02f),
    ("ECDHE-ECDSA-AES256-GCM-SHA384", "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", 0xc02c),
    ("ECDHE-RSA-AES256-GCM-SHA384", "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", 0xc030),
    ("ECDHE-ECDSA-CHACHA20-POLY1305", "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256", 0xcca9),
    ("ECDHE-RSA-CHACHA20-POLY1305", "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256", 0xcca8),
    // ECDHE CBC
    ("ECDHE-ECDSA-AES128-SHA256", "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256", 0xc023),
    ("ECDHE-RSA-AES128-SHA256", "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256", 0xc027),
    ("ECDHE-ECDSA-AES128-SHA", "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA", 0xc009),
    ("ECDHE-RSA-AES128-SHA", "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", 0xc013),
    ("ECDHE-ECDSA-AES256-SHA384", "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384", 0xc024),
    ("ECDHE-RSA-AES256-SHA384", "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384", 0xc028),
    ("ECDHE-ECDSA-AES256-SHA", "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA", 0xc00a),
    ("ECDHE-RSA-AES256-SHA", "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA", 0xc014),
    // Static RSA key exchange
    ("AES128-GCM-SHA256", "TLS_RSA_WITH_AES_128_GCM_SHA256", 0x009c),
    ("AES256-GCM-SHA384", "TLS_RSA_WITH_AES_256_GCM_SHA384", 0x009d),
    ("AES128-SHA256", "TLS_RSA_WITH_AES_128_CBC_SHA256", 0x003c),
    ("AES256-SHA256", "TLS_RSA_WITH_AES_256_CBC_SHA256", 0x003d),
    ("AES128-SHA", "TLS_RSA_WITH_AES_128_CBC_SHA", 0x002f),
    ("AES256-SHA", "TLS_RSA_WITH_AES_256_CBC_SHA", 0x0035),
    ("DES-CBC3-SHA", "TLS_RSA_WITH_3DES_EDE_CBC_SHA", 0x000a),
];

/// Look up one cipher by OpenSSL or IANA name.
#[must_use]
pub fn cipher_suite_id(name: &str) -> Option<CipherSuite> {
    CIPHER_TABLE
        .iter()
        .find(|(openssl, iana, _)| *openssl == name || *iana == name)
        .map(|&(_, _, id)| CipherSuite::from(id))
}

/// Map cipher names to wire identifiers, keeping order.
///
/// Unknown names are logged and skipped.
pub fn cipher_suite_ids<S: AsRef<str>>(names: &[S]) -> Vec<CipherSuite> {
    names
        .iter()
        .map(AsRef::as_ref)
        .filter_map(|name| {
            let id = cipher_suite_id(name);
            if id.is_none() {
                warn!(cipher = name, "Skipping unknown cipher suite name");
            }
            id
        })
        .collect()
}
