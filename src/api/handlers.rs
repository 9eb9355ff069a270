use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::credential::Credential;
use crate::provisioning::wizard::{ChoiceOption, WizardStage};
use crate::provisioning::{render_list, DriftReport, IssuedKey, Revoked, SettingsSummary};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize, Default)]
pub struct BeginRequest {
    pub label: Option<String>,
}

#[derive(Deserialize)]
pub struct ChoiceRequest {
    pub choice: String,
}

#[derive(Serialize)]
pub struct WizardStepResponse {
    pub stage: WizardStage,
    pub prompt: &'static str,
    pub options: Vec<ChoiceOption>,
}

#[derive(Serialize)]
pub struct IssuedKeyResponse {
    #[serde(flatten)]
    pub key: IssuedKey,
    pub message: String,
}

#[derive(Serialize)]
pub struct KeyListResponse {
    pub keys: Vec<Credential>,
    pub text: String,
}

#[derive(Serialize)]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub settings: SettingsSummary,
    pub text: String,
}

/// Operator identity taken from the `X-Operator-Id` header.
pub struct OperatorId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for OperatorId {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-operator-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| OperatorId(v.to_string()))
            .ok_or((StatusCode::BAD_REQUEST, "missing X-Operator-Id header"))
    }
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/v1/wizard: start (or restart) key creation
pub async fn begin_creation(
    State(state): State<Arc<AppState>>,
    OperatorId(operator): OperatorId,
    payload: Option<Json<BeginRequest>>,
) -> Json<WizardStepResponse> {
    let label = payload.and_then(|Json(p)| p.label);
    let options = state.provisioning.begin(&operator, label);
    Json(WizardStepResponse {
        stage: WizardStage::AwaitingExpirationChoice,
        prompt: "Choose the key lifetime",
        options,
    })
}

/// POST /api/v1/wizard/expiration: record the lifetime choice
pub async fn choose_expiration(
    State(state): State<Arc<AppState>>,
    OperatorId(operator): OperatorId,
    Json(payload): Json<ChoiceRequest>,
) -> Result<Json<WizardStepResponse>, AppError> {
    let options = state
        .provisioning
        .choose_expiration(&operator, &payload.choice)?;
    Ok(Json(WizardStepResponse {
        stage: WizardStage::AwaitingDeviceLimitChoice,
        prompt: "Choose the device limit",
        options,
    }))
}

/// POST /api/v1/wizard/devices: record the device limit and mint the key
pub async fn choose_device_limit(
    State(state): State<Arc<AppState>>,
    OperatorId(operator): OperatorId,
    Json(payload): Json<ChoiceRequest>,
) -> Result<(StatusCode, Json<IssuedKeyResponse>), AppError> {
    let key = state
        .provisioning
        .choose_device_limit(&operator, &payload.choice)
        .await?;
    let message = key.confirmation();
    Ok((StatusCode::CREATED, Json(IssuedKeyResponse { key, message })))
}

/// GET /api/v1/keys: list issued keys
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<KeyListResponse>, AppError> {
    let keys = state.provisioning.list().await?;
    let text = render_list(&keys);
    Ok(Json(KeyListResponse { keys, text }))
}

/// DELETE /api/v1/keys/:id: revoke a key
pub async fn revoke_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Revoked>, AppError> {
    Ok(Json(state.provisioning.revoke(&id).await?))
}

/// GET /api/v1/keys/audit: ids present in only one of config / registry
pub async fn audit_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DriftReport>, AppError> {
    Ok(Json(state.provisioning.audit().await?))
}

/// GET /api/v1/settings
pub async fn show_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    let settings = state.provisioning.settings();
    let text = settings.render();
    Json(SettingsResponse { settings, text })
}
