//! PAP CRUD surface (§4.H, §6): `Create`/`Get`/`List`/`Update` for the four
//! CR kinds, plus `ListActions`. `Delete` is delegated to the external CR
//! client per §4.H and isn't exposed here.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use authz_core::catalog::default_actions;
use authz_core::pap;
use authz_core::sync::{ClusterRoleBindingSpec, Entitlement, ObjectMeta, RoleBindingSpec, RoleRef, RoleRefKind, RoleSpec, TargetPath};

use crate::error::AppError;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct ObjectMetaDto {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: String,
    pub generation: i64,
}

impl From<ObjectMeta> for ObjectMetaDto {
    fn from(meta: ObjectMeta) -> Self {
        Self { name: meta.name, namespace: meta.namespace, uid: meta.uid, generation: meta.generation }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoleSpecDto {
    pub actions: Vec<String>,
}

impl From<RoleSpecDto> for RoleSpec {
    fn from(dto: RoleSpecDto) -> Self {
        Self { actions: dto.actions }
    }
}

impl From<RoleSpec> for RoleSpecDto {
    fn from(spec: RoleSpec) -> Self {
        Self { actions: spec.actions }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub metadata: ObjectMetaDto,
    pub spec: RoleSpecDto,
}

#[derive(Debug, Deserialize)]
pub struct EntitlementDto {
    pub claim: String,
    pub value: String,
}

impl From<EntitlementDto> for Entitlement {
    fn from(dto: EntitlementDto) -> Self {
        Self { claim: dto.claim, value: dto.value }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct TargetPathDto {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
}

impl From<TargetPathDto> for TargetPath {
    fn from(dto: TargetPathDto) -> Self {
        Self { project: dto.project, component: dto.component }
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleRefDto {
    pub kind: RoleRefKind,
    pub name: String,
}

impl From<RoleRefDto> for RoleRef {
    fn from(dto: RoleRefDto) -> Self {
        Self { kind: dto.kind, name: dto.name }
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleBindingSpecDto {
    pub entitlement: EntitlementDto,
    #[serde(default)]
    pub target_path: TargetPathDto,
    pub role_ref: RoleRefDto,
    pub effect: String,
}

#[derive(Debug, Deserialize)]
pub struct ClusterRoleBindingSpecDto {
    pub entitlement: EntitlementDto,
    pub role_ref: RoleRefDto,
    pub effect: String,
}

/// `POST /v1/namespaces/:namespace/roles/:name`
pub async fn create_role(
    State(state): State<SharedState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(body): Json<RoleSpecDto>,
) -> Result<Json<RoleResponse>, AppError> {
    let spec: RoleSpec = body.into();
    pap::validate_role_create(&spec).map_err(AppError::from)?;

    let meta = state.cr_registry.create_role(&state.store, &name, &namespace, spec.clone()).await?;
    Ok(Json(RoleResponse { metadata: meta.into(), spec: spec.into() }))
}

/// `GET /v1/namespaces/:namespace/roles/:name`
pub async fn get_role(State(state): State<SharedState>, Path((namespace, name)): Path<(String, String)>) -> Result<Json<RoleResponse>, AppError> {
    let (meta, spec) = state.cr_registry.get_role(&name, &namespace).await.ok_or_else(|| AppError::NotFound(format!("role '{name}' not found")))?;
    Ok(Json(RoleResponse { metadata: meta.into(), spec: spec.into() }))
}

/// `GET /v1/namespaces/:namespace/roles`
pub async fn list_roles(State(state): State<SharedState>, Path(namespace): Path<String>) -> Json<Vec<RoleResponse>> {
    let roles = state.cr_registry.list_roles(&namespace).await;
    Json(roles.into_iter().map(|(meta, spec)| RoleResponse { metadata: meta.into(), spec: spec.into() }).collect())
}

/// `PUT /v1/namespaces/:namespace/roles/:name`
pub async fn update_role(
    State(state): State<SharedState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(body): Json<RoleSpecDto>,
) -> Result<Json<RoleResponse>, AppError> {
    let spec: RoleSpec = body.into();
    pap::validate_role_create(&spec).map_err(AppError::from)?;

    let meta = state.cr_registry.update_role(&state.store, &name, &namespace, spec.clone()).await?;
    Ok(Json(RoleResponse { metadata: meta.into(), spec: spec.into() }))
}

/// `POST /v1/cluster-roles/:name`
pub async fn create_cluster_role(State(state): State<SharedState>, Path(name): Path<String>, Json(body): Json<RoleSpecDto>) -> Result<Json<RoleResponse>, AppError> {
    let spec: RoleSpec = body.into();
    pap::validate_role_create(&spec).map_err(AppError::from)?;
    let meta = state.cr_registry.create_cluster_role(&state.store, &name, spec.clone()).await?;
    Ok(Json(RoleResponse { metadata: meta.into(), spec: spec.into() }))
}

/// `GET /v1/cluster-roles/:name`
pub async fn get_cluster_role(State(state): State<SharedState>, Path(name): Path<String>) -> Result<Json<RoleResponse>, AppError> {
    let (meta, spec) = state.cr_registry.get_cluster_role(&name).await.ok_or_else(|| AppError::NotFound(format!("cluster role '{name}' not found")))?;
    Ok(Json(RoleResponse { metadata: meta.into(), spec: spec.into() }))
}

/// `GET /v1/cluster-roles`
pub async fn list_cluster_roles(State(state): State<SharedState>) -> Json<Vec<RoleResponse>> {
    let roles = state.cr_registry.list_cluster_roles().await;
    Json(roles.into_iter().map(|(meta, spec)| RoleResponse { metadata: meta.into(), spec: spec.into() }).collect())
}

/// `PUT /v1/cluster-roles/:name`
pub async fn update_cluster_role(State(state): State<SharedState>, Path(name): Path<String>, Json(body): Json<RoleSpecDto>) -> Result<Json<RoleResponse>, AppError> {
    let spec: RoleSpec = body.into();
    pap::validate_role_create(&spec).map_err(AppError::from)?;
    let meta = state.cr_registry.update_cluster_role(&state.store, &name, spec.clone()).await?;
    Ok(Json(RoleResponse { metadata: meta.into(), spec: spec.into() }))
}

#[derive(Debug, Serialize)]
pub struct RoleBindingResponse {
    pub metadata: ObjectMetaDto,
}

/// `POST /v1/namespaces/:namespace/role-bindings/:name`
pub async fn create_role_binding(
    State(state): State<SharedState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(body): Json<RoleBindingSpecDto>,
) -> Result<Json<RoleBindingResponse>, AppError> {
    let spec = RoleBindingSpec {
        entitlement: body.entitlement.into(),
        target_path: body.target_path.into(),
        role_ref: body.role_ref.into(),
        effect: body.effect,
    };
    pap::validate_role_binding_create(&namespace, None, &spec).map_err(AppError::from)?;

    let meta = state.cr_registry.create_role_binding(&state.store, &name, &namespace, spec).await?;
    Ok(Json(RoleBindingResponse { metadata: meta.into() }))
}

/// `GET /v1/namespaces/:namespace/role-bindings/:name`
pub async fn get_role_binding(State(state): State<SharedState>, Path((namespace, name)): Path<(String, String)>) -> Result<Json<RoleBindingResponse>, AppError> {
    let (meta, _spec) = state
        .cr_registry
        .get_role_binding(&name, &namespace)
        .await
        .ok_or_else(|| AppError::NotFound(format!("role binding '{name}' not found")))?;
    Ok(Json(RoleBindingResponse { metadata: meta.into() }))
}

/// `GET /v1/namespaces/:namespace/role-bindings`
pub async fn list_role_bindings(State(state): State<SharedState>, Path(namespace): Path<String>) -> Json<Vec<RoleBindingResponse>> {
    let bindings = state.cr_registry.list_role_bindings(&namespace).await;
    Json(bindings.into_iter().map(|(meta, _)| RoleBindingResponse { metadata: meta.into() }).collect())
}

/// `PUT /v1/namespaces/:namespace/role-bindings/:name`
pub async fn update_role_binding(
    State(state): State<SharedState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(body): Json<RoleBindingSpecDto>,
) -> Result<Json<RoleBindingResponse>, AppError> {
    let spec = RoleBindingSpec {
        entitlement: body.entitlement.into(),
        target_path: body.target_path.into(),
        role_ref: body.role_ref.into(),
        effect: body.effect,
    };
    pap::validate_role_binding_create(&namespace, None, &spec).map_err(AppError::from)?;

    let meta = state.cr_registry.update_role_binding(&state.store, &name, &namespace, spec).await?;
    Ok(Json(RoleBindingResponse { metadata: meta.into() }))
}

/// `POST /v1/cluster-role-bindings/:name`
pub async fn create_cluster_role_binding(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(body): Json<ClusterRoleBindingSpecDto>,
) -> Result<Json<RoleBindingResponse>, AppError> {
    let spec = ClusterRoleBindingSpec { entitlement: body.entitlement.into(), role_ref: body.role_ref.into(), effect: body.effect };
    pap::validate_cluster_role_binding_create(&spec).map_err(AppError::from)?;

    let meta = state.cr_registry.create_cluster_role_binding(&state.store, &name, spec).await?;
    Ok(Json(RoleBindingResponse { metadata: meta.into() }))
}

/// `GET /v1/cluster-role-bindings/:name`
pub async fn get_cluster_role_binding(State(state): State<SharedState>, Path(name): Path<String>) -> Result<Json<RoleBindingResponse>, AppError> {
    let (meta, _spec) = state.cr_registry.get_cluster_role_binding(&name).await.ok_or_else(|| AppError::NotFound(format!("cluster role binding '{name}' not found")))?;
    Ok(Json(RoleBindingResponse { metadata: meta.into() }))
}

/// `GET /v1/cluster-role-bindings`
pub async fn list_cluster_role_bindings(State(state): State<SharedState>) -> Json<Vec<RoleBindingResponse>> {
    let bindings = state.cr_registry.list_cluster_role_bindings().await;
    Json(bindings.into_iter().map(|(meta, _)| RoleBindingResponse { metadata: meta.into() }).collect())
}

/// `PUT /v1/cluster-role-bindings/:name`
pub async fn update_cluster_role_binding(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(body): Json<ClusterRoleBindingSpecDto>,
) -> Result<Json<RoleBindingResponse>, AppError> {
    let spec = ClusterRoleBindingSpec { entitlement: body.entitlement.into(), role_ref: body.role_ref.into(), effect: body.effect };
    pap::validate_cluster_role_binding_create(&spec).map_err(AppError::from)?;

    let meta = state.cr_registry.update_cluster_role_binding(&state.store, &name, spec).await?;
    Ok(Json(RoleBindingResponse { metadata: meta.into() }))
}

/// `GET /v1/actions` — `ListActions` (§6).
pub async fn list_actions(State(state): State<SharedState>) -> Result<Json<Vec<String>>, AppError> {
    let rows = state
        .store
        .backend()
        .list_actions()
        .await
        .map_err(|err| AppError::from(authz_core::error::StoreError::from(err)))?;
    let actions: Vec<authz_core::catalog::Action> = rows.into_iter().map(|r| authz_core::catalog::Action::new(r.name, r.internal)).collect();
    let actions = if actions.is_empty() { default_actions() } else { actions };
    Ok(Json(pap::list_actions(&actions)))
}
