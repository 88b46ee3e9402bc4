//! Client identity derivation from forwarded-address headers
//!
//! The identity is advisory only. Both headers are client-controlled unless a
//! trusted proxy rewrites them, so anything stronger than best-effort fairness
//! needs an authenticated identity upstream of the admission controller.

use axum::http::HeaderMap;
use std::fmt;

pub const FORWARDED_FOR: &str = "x-forwarded-for";
pub const REAL_IP: &str = "x-real-ip";

/// Key used to partition admission state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Shared bucket for every request without a derivable address
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    /// First present of `x-forwarded-for` (leftmost hop), `x-real-ip`,
    /// falling back to the anonymous bucket.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let forwarded = header_str(headers, FORWARDED_FOR)
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());

        forwarded
            .or_else(|| header_str(headers, REAL_IP).map(str::trim).filter(|ip| !ip.is_empty()))
            .map(Self::new)
            .unwrap_or_else(Self::anonymous)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == Self::ANONYMOUS
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
