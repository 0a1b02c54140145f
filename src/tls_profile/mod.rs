//! TLS security profile selection.
//!
//! ```text
//! CdiConfig.spec.tlsSecurityProfile
//!   → profile.rs  (TlsProfileType: Old | Intermediate | Modern | Custom)
//!   → ciphers.rs  (cipher names → wire identifiers, unknown names skipped)
//!   → policy.rs   (TlsPolicy; anything unusable → Intermediate)
//!   → watcher.rs  (atomic snapshot swap on every change)
//! ```

pub mod ciphers;
pub mod policy;
pub mod profile;
pub mod watcher;

pub use ciphers::{cipher_suite_id, cipher_suite_ids};
pub use policy::TlsPolicy;
pub use profile::{
    CdiConfig, CdiConfigSpec, CustomTlsProfile, TLS_PROFILE_RESOURCE_NAME, TlsProfileType,
    TlsSecurityProfile, TlsVersion,
};
pub use watcher::{TlsPolicyWatch, TlsProfileWatcher};
