//! `Evaluate` / `BatchEvaluate` / `GetSubjectProfile` (§6).

use std::sync::atomic::AtomicBool;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use authz_core::matcher::ResourceHierarchy;
use authz_core::pdp::{self, CancellationToken, EvaluateRequest, ProfileRequest, ResourceRef};
use authz_core::subject;

use crate::auth::bearer_token;
use crate::error::AppError;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct HierarchyDto {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
}

impl From<HierarchyDto> for ResourceHierarchy {
    fn from(dto: HierarchyDto) -> Self {
        Self::new(dto.namespace, dto.project, dto.component)
    }
}

#[derive(Debug, Deserialize)]
pub struct ResourceDto {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub id: Option<String>,
    pub hierarchy: HierarchyDto,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateBody {
    pub resource: ResourceDto,
    pub action: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Serialize)]
pub struct DecisionDto {
    pub allowed: bool,
    pub reason: String,
}

async fn build_evaluate_request(headers: &HeaderMap, state: &SharedState, body: EvaluateBody) -> Result<EvaluateRequest, AppError> {
    let token = bearer_token(headers)?;
    let subject_context = subject::detect(token, &state.subject_configs)?;
    Ok(EvaluateRequest {
        subject_context,
        resource: ResourceRef { resource_type: body.resource.resource_type, id: body.resource.id, hierarchy: body.resource.hierarchy.into() },
        action: body.action,
        context: body.context,
    })
}

/// `POST /v1/evaluate`
pub async fn evaluate(State(state): State<SharedState>, headers: HeaderMap, Json(body): Json<EvaluateBody>) -> Result<Json<DecisionDto>, AppError> {
    let request = build_evaluate_request(&headers, &state, body).await?;
    let decision = pdp::evaluate(&state.store, &request).await?;
    Ok(Json(DecisionDto { allowed: decision.allowed, reason: decision.reason }))
}

#[derive(Debug, Deserialize)]
pub struct BatchEvaluateBody {
    pub requests: Vec<EvaluateBody>,
}

#[derive(Debug, Serialize)]
pub struct BatchDecisionDto {
    pub allowed: bool,
    pub reason: Option<String>,
    pub error: Option<String>,
}

/// `POST /v1/batch-evaluate`
pub async fn batch_evaluate(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<BatchEvaluateBody>,
) -> Result<Json<Vec<BatchDecisionDto>>, AppError> {
    let mut requests = Vec::with_capacity(body.requests.len());
    for item in body.requests {
        requests.push(build_evaluate_request(&headers, &state, item).await?);
    }

    let cancelled = AtomicBool::new(false);
    let results = pdp::batch_evaluate(&state.store, &requests, CancellationToken::new(&cancelled)).await?;

    let decisions = results
        .into_iter()
        .map(|result| match result {
            Ok(decision) => BatchDecisionDto { allowed: decision.allowed, reason: Some(decision.reason), error: None },
            Err(err) => BatchDecisionDto { allowed: false, reason: None, error: Some(err.to_string()) },
        })
        .collect();
    Ok(Json(decisions))
}

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    #[serde(default)]
    pub scope: HierarchyDto,
}

#[derive(Debug, Serialize)]
pub struct CapabilityResourceDto {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ActionCapabilityDto {
    pub allowed: Vec<CapabilityResourceDto>,
    pub denied: Vec<CapabilityResourceDto>,
}

#[derive(Debug, Serialize)]
pub struct UserCapabilitiesDto {
    pub user: String,
    pub capabilities: std::collections::HashMap<String, ActionCapabilityDto>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// `POST /v1/subject-profile`
pub async fn subject_profile(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<ProfileBody>,
) -> Result<Json<UserCapabilitiesDto>, AppError> {
    let token = bearer_token(&headers)?;
    let subject_context = subject::detect(token, &state.subject_configs)?;

    let request = ProfileRequest { subject_context, scope: body.scope.into() };
    let cancelled = AtomicBool::new(false);
    let profile = pdp::subject_profile(&state.store, &request, CancellationToken::new(&cancelled)).await?;

    let capabilities = profile
        .capabilities
        .into_iter()
        .map(|(action, capability)| {
            (
                action,
                ActionCapabilityDto {
                    allowed: capability.allowed.into_iter().map(|r| CapabilityResourceDto { path: r.path }).collect(),
                    denied: capability.denied.into_iter().map(|r| CapabilityResourceDto { path: r.path }).collect(),
                },
            )
        })
        .collect();

    Ok(Json(UserCapabilitiesDto { user: profile.user, capabilities, generated_at: profile.generated_at }))
}
