//! Multi-step key creation: choice tables and per-operator pending sessions.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationChoice {
    OneDay,
    SevenDays,
    ThirtyDays,
    Permanent,
}

impl ExpirationChoice {
    pub const ALL: [ExpirationChoice; 4] = [
        ExpirationChoice::OneDay,
        ExpirationChoice::SevenDays,
        ExpirationChoice::ThirtyDays,
        ExpirationChoice::Permanent,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ExpirationChoice::OneDay => "1d",
            ExpirationChoice::SevenDays => "7d",
            ExpirationChoice::ThirtyDays => "30d",
            ExpirationChoice::Permanent => "permanent",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ExpirationChoice::OneDay => "1 day",
            ExpirationChoice::SevenDays => "7 days",
            ExpirationChoice::ThirtyDays => "30 days",
            ExpirationChoice::Permanent => "No expiration",
        }
    }

    pub fn lifetime(self) -> Option<Duration> {
        match self {
            ExpirationChoice::OneDay => Some(Duration::days(1)),
            ExpirationChoice::SevenDays => Some(Duration::days(7)),
            ExpirationChoice::ThirtyDays => Some(Duration::days(30)),
            ExpirationChoice::Permanent => None,
        }
    }

    pub fn resolve(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lifetime().map(|d| now + d)
    }
}

impl FromStr for ExpirationChoice {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.key() == s)
            .ok_or_else(|| AppError::UnknownChoice(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLimitChoice {
    One,
    Three,
    Five,
    Unlimited,
}

impl DeviceLimitChoice {
    pub const ALL: [DeviceLimitChoice; 4] = [
        DeviceLimitChoice::One,
        DeviceLimitChoice::Three,
        DeviceLimitChoice::Five,
        DeviceLimitChoice::Unlimited,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DeviceLimitChoice::One => "1",
            DeviceLimitChoice::Three => "3",
            DeviceLimitChoice::Five => "5",
            DeviceLimitChoice::Unlimited => "unlimited",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DeviceLimitChoice::One => "1 device",
            DeviceLimitChoice::Three => "3 devices",
            DeviceLimitChoice::Five => "5 devices",
            DeviceLimitChoice::Unlimited => "Unlimited",
        }
    }

    pub fn limit(self) -> Option<i32> {
        match self {
            DeviceLimitChoice::One => Some(1),
            DeviceLimitChoice::Three => Some(3),
            DeviceLimitChoice::Five => Some(5),
            DeviceLimitChoice::Unlimited => None,
        }
    }
}

impl FromStr for DeviceLimitChoice {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.key() == s)
            .ok_or_else(|| AppError::UnknownChoice(s.to_string()))
    }
}

/// One selectable option shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    pub key: &'static str,
    pub title: &'static str,
}

pub fn expiration_options() -> Vec<ChoiceOption> {
    ExpirationChoice::ALL
        .into_iter()
        .map(|c| ChoiceOption {
            key: c.key(),
            title: c.title(),
        })
        .collect()
}

pub fn device_limit_options() -> Vec<ChoiceOption> {
    DeviceLimitChoice::ALL
        .into_iter()
        .map(|c| ChoiceOption {
            key: c.key(),
            title: c.title(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStage {
    AwaitingExpirationChoice,
    AwaitingDeviceLimitChoice,
}

/// Input collected so far for one operator's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreation {
    pub label: String,
    pub stage: WizardStage,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PendingCreation {
    pub fn new(label: String) -> Self {
        Self {
            label,
            stage: WizardStage::AwaitingExpirationChoice,
            expires_at: None,
        }
    }
}

/// Pending sessions keyed by operator identity. Sessions of different
/// operators never touch each other.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, PendingCreation>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a session, discarding any earlier one.
    pub fn begin(&self, operator: &str, label: String) {
        self.sessions
            .insert(operator.to_string(), PendingCreation::new(label));
    }

    pub fn get(&self, operator: &str) -> Option<PendingCreation> {
        self.sessions.get(operator).map(|s| s.clone())
    }

    pub fn record_expiration(
        &self,
        operator: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut session = self
            .sessions
            .get_mut(operator)
            .ok_or(AppError::NoActiveSession)?;
        session.expires_at = expires_at;
        session.stage = WizardStage::AwaitingDeviceLimitChoice;
        Ok(())
    }

    /// Remove the session once it is ready to finalize.
    pub fn take_ready(&self, operator: &str) -> Result<PendingCreation, AppError> {
        match self.get(operator) {
            None => Err(AppError::NoActiveSession),
            Some(s) if s.stage != WizardStage::AwaitingDeviceLimitChoice => {
                Err(AppError::WizardOutOfOrder {
                    expected: "an expiration",
                })
            }
            Some(_) => self
                .sessions
                .remove(operator)
                .map(|(_, s)| s)
                .ok_or(AppError::NoActiveSession),
        }
    }

    pub fn discard(&self, operator: &str) {
        self.sessions.remove(operator);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
