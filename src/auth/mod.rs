//! Cluster authentication descriptor handling.
//!
//! # Data Flow
//!
//! ```text
//! extension-apiserver-authentication (key/value)
//!   → descriptor.rs   (fixed keys, pseudo-array lists)
//!   → config.rs       (AuthConfig: CA pool + header names + allowed CNs)
//!   → watcher.rs      (atomic snapshot swap on every change)
//!   → request_header.rs (front-proxy identity, gated by validate_name)
//! ```

pub mod config;
pub mod descriptor;
pub mod request_header;
pub mod watcher;

pub use config::AuthConfig;
pub use descriptor::{AUTH_DESCRIPTOR_NAME, AuthDescriptor, deserialize_string_slice};
pub use request_header::{ForwardedUser, authenticate};
pub use watcher::{AuthConfigWatch, AuthConfigWatcher};
