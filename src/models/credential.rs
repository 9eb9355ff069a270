use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issued VLESS key as recorded in the registry.
///
/// `id` is the client UUID written into the XRay config; it is the only
/// link between a registry row and its config entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Credential {
    pub id: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Maximum distinct source addresses; `None` is unlimited.
    pub device_limit: Option<i32>,
}

impl Credential {
    pub fn is_expired(&self, as_of: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= as_of)
    }

    /// Multi-line entry used by key listings.
    pub fn summary(&self) -> String {
        let label = if self.label.is_empty() {
            "no_label"
        } else {
            self.label.as_str()
        };
        format!(
            "• {}\n  UUID: {}\n  {}\n  {}",
            label,
            self.id,
            describe_expiration(self.expires_at),
            describe_device_limit(self.device_limit),
        )
    }
}

pub fn describe_expiration(expires_at: Option<DateTime<Utc>>) -> String {
    match expires_at {
        Some(at) => format!("Valid until: {}", at.format("%Y-%m-%d %H:%M UTC")),
        None => "No expiration".to_string(),
    }
}

pub fn describe_device_limit(limit: Option<i32>) -> String {
    match limit {
        Some(n) => format!("Device limit: {}", n),
        None => "Device limit: unlimited".to_string(),
    }
}
