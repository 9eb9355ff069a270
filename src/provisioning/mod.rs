//! Key issuance and revocation.
//!
//! Creation is a three-step wizard (begin → expiration → device limit).
//! The final step writes the XRay config first, then the registry, then
//! reloads XRay. A failure after the config write is not rolled back; the
//! drift shows up in [`ProvisioningService::audit`].

pub mod artifact;
pub mod wizard;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::NetworkSettings;
use crate::errors::AppError;
use crate::models::credential::{describe_device_limit, describe_expiration, Credential};
use crate::store::CredentialRegistry;
use crate::xray::{link, XrayConfigFile, XrayReloader};

use artifact::{ConnectionArtifact, QrRenderer};
use wizard::{
    device_limit_options, expiration_options, ChoiceOption, DeviceLimitChoice, ExpirationChoice,
    PendingCreation, SessionStore,
};

/// Attempts at drawing a client id that is not already in the config.
const MAX_ID_ATTEMPTS: usize = 3;

/// Source of fresh client ids.
pub type IdSource = Arc<dyn Fn() -> String + Send + Sync>;

pub fn uuid_ids() -> IdSource {
    Arc::new(|| Uuid::new_v4().to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedKey {
    pub credential: Credential,
    pub artifact: ConnectionArtifact,
    /// False when XRay could not be reloaded; the key works after the next reload.
    pub reloaded: bool,
}

impl IssuedKey {
    pub fn confirmation(&self) -> String {
        let mut lines = vec![
            "✅ Key created".to_string(),
            self.artifact.uri.clone(),
            describe_expiration(self.credential.expires_at),
            describe_device_limit(self.credential.device_limit),
        ];
        if !self.reloaded {
            lines.push("⚠️ XRay was not reloaded; the key activates on the next reload".into());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Revoked {
    pub id: String,
    pub reloaded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsSummary {
    pub config_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub reload_command: String,
}

impl SettingsSummary {
    pub fn render(&self) -> String {
        format!(
            "⚙️ Settings:\n• XRAY_CONFIG_PATH: {}\n• XRAY_HOST: {}\n• XRAY_PORT: {}\n• XRAY_RELOAD_COMMAND: {}",
            self.config_path.display(),
            self.host,
            self.port,
            self.reload_command,
        )
    }
}

/// Ids present in only one of the two stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub only_in_config: Vec<String>,
    pub only_in_registry: Vec<String>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.only_in_config.is_empty() && self.only_in_registry.is_empty()
    }
}

pub struct ProvisioningService {
    config_file: XrayConfigFile,
    registry: Arc<dyn CredentialRegistry>,
    reloader: XrayReloader,
    network: NetworkSettings,
    sessions: SessionStore,
    clock: Arc<dyn Clock>,
    qr: Arc<dyn QrRenderer>,
    next_id: IdSource,
}

impl ProvisioningService {
    pub fn new(
        config_file: XrayConfigFile,
        registry: Arc<dyn CredentialRegistry>,
        reloader: XrayReloader,
        network: NetworkSettings,
        clock: Arc<dyn Clock>,
        qr: Arc<dyn QrRenderer>,
    ) -> Self {
        Self {
            config_file,
            registry,
            reloader,
            network,
            sessions: SessionStore::new(),
            clock,
            qr,
            next_id: uuid_ids(),
        }
    }

    /// Replace the UUIDv4 id source.
    pub fn with_id_source(mut self, next_id: IdSource) -> Self {
        self.next_id = next_id;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn default_label(operator: &str) -> String {
        format!("user_{}@vpn.local", operator)
    }

    // -- Wizard --

    /// Start a creation request for `operator`, replacing any pending one.
    pub fn begin(&self, operator: &str, label: Option<String>) -> Vec<ChoiceOption> {
        let label = label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| Self::default_label(operator));
        self.sessions.begin(operator, label);
        tracing::debug!(operator, "key creation started");
        expiration_options()
    }

    pub fn choose_expiration(
        &self,
        operator: &str,
        choice: &str,
    ) -> Result<Vec<ChoiceOption>, AppError> {
        if self.sessions.get(operator).is_none() {
            return Err(AppError::NoActiveSession);
        }
        let choice: ExpirationChoice = choice.parse()?;
        let expires_at = choice.resolve(self.clock.now_utc());
        self.sessions.record_expiration(operator, expires_at)?;
        Ok(device_limit_options())
    }

    /// Last wizard step: mints the key. The pending session is consumed
    /// whether or not minting succeeds.
    pub async fn choose_device_limit(
        &self,
        operator: &str,
        choice: &str,
    ) -> Result<IssuedKey, AppError> {
        if self.sessions.get(operator).is_none() {
            return Err(AppError::NoActiveSession);
        }
        let choice: DeviceLimitChoice = choice.parse()?;
        let pending = self.sessions.take_ready(operator)?;

        match self.finalize(pending, choice.limit()).await {
            Ok(issued) => Ok(issued),
            Err(e) => {
                tracing::error!(operator, error = %e, "key creation failed");
                Err(AppError::ProvisioningFailed)
            }
        }
    }

    /// Run all three wizard steps in one call.
    pub async fn create_key(
        &self,
        operator: &str,
        label: Option<String>,
        expiration: &str,
        devices: &str,
    ) -> Result<IssuedKey, AppError> {
        self.begin(operator, label);
        if let Err(e) = self.choose_expiration(operator, expiration) {
            self.sessions.discard(operator);
            return Err(e);
        }
        let result = self.choose_device_limit(operator, devices).await;
        if result.is_err() {
            self.sessions.discard(operator);
        }
        result
    }

    async fn finalize(
        &self,
        pending: PendingCreation,
        device_limit: Option<i32>,
    ) -> Result<IssuedKey, AppError> {
        let id = self.add_to_config(&pending.label)?;
        let uri = link::compose(&id, &pending.label, &self.network);

        let credential = Credential {
            id: id.clone(),
            label: pending.label,
            created_at: self.clock.now_utc(),
            expires_at: pending.expires_at,
            device_limit,
        };
        self.registry.insert(&credential).await?;

        let reloaded = self.reloader.reload().await;
        let image = self.qr.render(&id, &uri)?;

        tracing::info!(
            id = %id,
            expires_at = ?credential.expires_at,
            device_limit = ?credential.device_limit,
            "key created"
        );

        Ok(IssuedKey {
            credential,
            artifact: ConnectionArtifact { uri, image },
            reloaded,
        })
    }

    /// Append a fresh client to the config, redrawing the id on collision.
    fn add_to_config(&self, label: &str) -> Result<String, AppError> {
        let mut last_err = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = (self.next_id)();
            match self.config_file.create_client(&id, label) {
                Ok(()) => return Ok(id),
                Err(AppError::DuplicateCredential(dup)) => {
                    tracing::warn!(id = %dup, "generated client id already in config, retrying");
                    last_err = Some(AppError::DuplicateCredential(dup));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(AppError::ProvisioningFailed))
    }

    // -- Revocation & read-only views --

    pub async fn revoke(&self, id: &str) -> Result<Revoked, AppError> {
        let id = id.trim();
        if !self.config_file.remove_client(id)? {
            return Err(AppError::NotFound(id.to_string()));
        }
        if !self.registry.delete(id).await? {
            tracing::warn!(id, "revoked key had no registry row");
        }
        let reloaded = self.reloader.reload().await;
        tracing::info!(id, "key revoked");
        Ok(Revoked {
            id: id.to_string(),
            reloaded,
        })
    }

    pub async fn list(&self) -> Result<Vec<Credential>, AppError> {
        self.registry.list_all().await
    }

    pub fn settings(&self) -> SettingsSummary {
        SettingsSummary {
            config_path: self.config_file.path().to_path_buf(),
            host: self.network.host.clone(),
            port: self.network.port,
            reload_command: self.reloader.command().join(" "),
        }
    }

    pub async fn audit(&self) -> Result<DriftReport, AppError> {
        let in_config: BTreeSet<String> = self.config_file.client_ids()?.into_iter().collect();
        let in_registry: BTreeSet<String> = self
            .registry
            .list_all()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        Ok(DriftReport {
            only_in_config: in_config.difference(&in_registry).cloned().collect(),
            only_in_registry: in_registry.difference(&in_config).cloned().collect(),
        })
    }
}

/// Text for a key listing.
pub fn render_list(keys: &[Credential]) -> String {
    if keys.is_empty() {
        return "No keys yet".to_string();
    }
    let entries: Vec<String> = keys.iter().map(Credential::summary).collect();
    format!("Keys:\n{}", entries.join("\n"))
}
