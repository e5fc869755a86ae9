//! `authz` CLI — operator tool for the authorization engine's policy store.
//!
//! Talks directly to `authz-core`/`authz-store` against a local SQLite file
//! (or an in-memory store for throwaway checks) — no running `authz-server`
//! required. Useful for seeding a database, replaying a synchronizer event
//! by hand, and running one-off `Evaluate`/`SubjectProfile` queries while
//! debugging a policy.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use authz_core::config::CacheConfig;
use authz_core::matcher::ResourceHierarchy;
use authz_core::pdp::{self, CancellationToken, EvaluateRequest, ProfileRequest, ResourceRef};
use authz_core::sync::{CrKind, Event, ObjectMeta, RawObject, RoleRefKind};
use authz_core::{catalog, seeder, sync, PolicyStore};
use authz_store::{MemoryBackend, PolicyBackend, SqliteBackend};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(err) => eprintln!("failed to format JSON: {err}"),
    }
}

/// `authz` — inspect and mutate a local authorization policy store.
#[derive(Parser)]
#[command(
    name = "authz",
    version,
    about = "Operator CLI for the OpenChoreo authorization engine",
    long_about = None,
    after_help = format!(
        "{DIM}Examples:{RESET}\n  \
         authz seed\n  \
         authz role add editor --actions component:view,component:create --namespace acme\n  \
         authz role-binding add --claim groups --value devs --role editor --namespace acme\n  \
         authz evaluate --claim groups --value devs --namespace acme --action component:view"
    )
)]
struct Cli {
    /// Path to the SQLite policy file, or `:memory:` for a throwaway store.
    #[arg(long, global = true, default_value = "authz.db")]
    data_file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the store with the built-in default actions, roles, and bindings.
    Seed,
    /// List actions known to the catalog.
    Actions {
        /// Show only `PublicActions` (excludes seeded/internal actions).
        #[arg(long)]
        public: bool,
        /// Show only `ConcretePublicActions` (public, no wildcards).
        #[arg(long)]
        concrete: bool,
    },
    /// Role grant operations (`g` relation).
    Role {
        #[command(subcommand)]
        action: RoleCommands,
    },
    /// Role binding operations (`p` relation).
    RoleBinding {
        #[command(subcommand)]
        action: RoleBindingCommands,
    },
    /// `Evaluate`: decide a single request.
    Evaluate {
        /// Claim to form the subject from (e.g. `groups`).
        #[arg(long)]
        claim: String,
        /// Claim value(s) the subject carries; repeat for multiple.
        #[arg(long = "value", required = true)]
        values: Vec<String>,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        component: Option<String>,
        /// Action being requested, e.g. `component:view`.
        #[arg(long)]
        action: String,
        /// Reserved context string (empty by default, §4.C).
        #[arg(long, default_value = "")]
        context: String,
    },
    /// `BatchEvaluate`: decide every request in a JSON array file.
    ///
    /// Each element has the same shape as `evaluate`'s flags:
    /// `{"claim", "values", "namespace", "project", "component", "action", "context"}`.
    BatchEvaluate {
        /// Path to a JSON file containing an array of request objects.
        file: String,
    },
    /// `SubjectProfile`: the full capability map for a subject within a scope.
    SubjectProfile {
        #[arg(long)]
        claim: String,
        #[arg(long = "value", required = true)]
        values: Vec<String>,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        component: Option<String>,
    },
}

#[derive(Subcommand)]
enum RoleCommands {
    /// Grant one or more actions to a role (an ADD `Role`/`ClusterRole` event).
    Add {
        /// Role name.
        name: String,
        /// Comma-separated actions, e.g. `component:view,component:create`.
        #[arg(long, value_delimiter = ',', required = true)]
        actions: Vec<String>,
        /// Namespace the role lives in; omit for a cluster-scoped role.
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Revoke one or more actions from a role (a DELETE `Role`/`ClusterRole` event).
    Remove {
        name: String,
        #[arg(long, value_delimiter = ',', required = true)]
        actions: Vec<String>,
        #[arg(long)]
        namespace: Option<String>,
    },
}

#[derive(Subcommand)]
enum RoleBindingCommands {
    /// Bind an entitlement to a role within a hierarchy (an ADD `RoleBinding`/`ClusterRoleBinding` event).
    Add {
        #[arg(long)]
        claim: String,
        #[arg(long)]
        value: String,
        /// Role being bound.
        #[arg(long)]
        role: String,
        /// Bind to a `ClusterRole` instead of a namespace `Role`.
        #[arg(long)]
        cluster: bool,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        component: Option<String>,
        #[arg(long, default_value = "allow")]
        effect: String,
    },
    /// Remove a binding (a DELETE `RoleBinding`/`ClusterRoleBinding` event).
    Remove {
        #[arg(long)]
        claim: String,
        #[arg(long)]
        value: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        cluster: bool,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        component: Option<String>,
        #[arg(long, default_value = "allow")]
        effect: String,
    },
}

async fn open_store(data_file: &str) -> Result<PolicyStore> {
    let backend: Arc<dyn PolicyBackend> = if data_file == ":memory:" {
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(SqliteBackend::connect(data_file).await.with_context(|| format!("failed to open '{data_file}'"))?)
    };
    Ok(PolicyStore::new(backend, CacheConfig::default()))
}

fn role_meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta { name: name.to_string(), namespace: namespace.map(ToString::to_string), uid: name.to_string(), generation: 1 }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{RED}{BOLD}error:{RESET} {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Seed => cmd_seed(&cli.data_file).await,
        Commands::Actions { public, concrete } => cmd_actions(&cli.data_file, public, concrete).await,
        Commands::Role { action } => cmd_role(&cli.data_file, action).await,
        Commands::RoleBinding { action } => cmd_role_binding(&cli.data_file, action).await,
        Commands::Evaluate { claim, values, namespace, project, component, action, context } => {
            cmd_evaluate(&cli.data_file, claim, values, namespace, project, component, action, context).await
        }
        Commands::BatchEvaluate { file } => cmd_batch_evaluate(&cli.data_file, &file).await,
        Commands::SubjectProfile { claim, values, namespace, project, component } => {
            cmd_subject_profile(&cli.data_file, claim, values, namespace, project, component).await
        }
    }
}

async fn cmd_seed(data_file: &str) -> Result<()> {
    let store = open_store(data_file).await?;
    let summary = seeder::seed_defaults(&store).await.context("seeding failed")?;
    success(&format!(
        "seeded {CYAN}{}{RESET} actions, {CYAN}{}{RESET} grants, {CYAN}{}{RESET} bindings into {BOLD}{data_file}{RESET}",
        summary.actions_inserted, summary.grants_inserted, summary.bindings_inserted
    ));
    Ok(())
}

async fn cmd_actions(data_file: &str, public: bool, concrete: bool) -> Result<()> {
    let store = open_store(data_file).await?;
    let rows = store.backend().list_actions().await.context("failed to list actions")?;
    let actions: Vec<catalog::Action> = if rows.is_empty() {
        catalog::default_actions()
    } else {
        rows.into_iter().map(|r| catalog::Action::new(r.name, r.internal)).collect()
    };

    let names: Vec<String> = if concrete {
        catalog::concrete_public_actions(&actions).into_iter().map(|a| a.name).collect()
    } else if public {
        catalog::public_actions(&actions).into_iter().map(|a| a.name).collect()
    } else {
        catalog::all_actions(&actions).into_iter().map(|a| a.name).collect()
    };

    for name in names {
        println!("{name}");
    }
    Ok(())
}

async fn cmd_role(data_file: &str, action: RoleCommands) -> Result<()> {
    let store = open_store(data_file).await?;
    match action {
        RoleCommands::Add { name, actions, namespace } => {
            let cluster_scoped = namespace.is_none();
            let kind = if cluster_scoped { CrKind::ClusterRole } else { CrKind::Role };
            let object = RawObject { meta: role_meta(&name, namespace.as_deref()), spec: serde_json::json!({ "actions": actions }) };
            sync::try_handle_event(&store, &Event::Added { kind, object }).await.context("failed to grant actions")?;
            success(&format!("granted {} action(s) to role {BOLD}{name}{RESET}", actions.len()));
        }
        RoleCommands::Remove { name, actions, namespace } => {
            let cluster_scoped = namespace.is_none();
            let kind = if cluster_scoped { CrKind::ClusterRole } else { CrKind::Role };
            let object = RawObject { meta: role_meta(&name, namespace.as_deref()), spec: serde_json::json!({ "actions": actions }) };
            sync::try_handle_event(&store, &Event::Deleted { kind, object, tombstone: false }).await.context("failed to revoke actions")?;
            success(&format!("revoked {} action(s) from role {BOLD}{name}{RESET}", actions.len()));
        }
    }
    Ok(())
}

fn role_binding_object(claim: &str, value: &str, role: &str, cluster: bool, namespace: Option<&str>, project: Option<&str>, component: Option<&str>, effect: &str) -> Result<(CrKind, RawObject)> {
    if effect.is_empty() {
        bail!("--effect must be non-empty");
    }
    let meta = role_meta(&format!("{claim}-{value}-{role}"), namespace);
    let entitlement = serde_json::json!({ "claim": claim, "value": value });
    let role_ref_kind = if cluster { RoleRefKind::ClusterRole } else { RoleRefKind::Role };

    if cluster {
        let spec = serde_json::json!({
            "entitlement": entitlement,
            "role_ref": { "kind": role_ref_kind, "name": role },
            "effect": effect,
        });
        Ok((CrKind::ClusterRoleBinding, RawObject { meta, spec }))
    } else {
        let spec = serde_json::json!({
            "entitlement": entitlement,
            "target_path": { "project": project, "component": component },
            "role_ref": { "kind": role_ref_kind, "name": role },
            "effect": effect,
        });
        Ok((CrKind::RoleBinding, RawObject { meta, spec }))
    }
}

async fn cmd_role_binding(data_file: &str, action: RoleBindingCommands) -> Result<()> {
    let store = open_store(data_file).await?;
    match action {
        RoleBindingCommands::Add { claim, value, role, cluster, namespace, project, component, effect } => {
            let (kind, object) = role_binding_object(&claim, &value, &role, cluster, namespace.as_deref(), project.as_deref(), component.as_deref(), &effect)?;
            sync::try_handle_event(&store, &Event::Added { kind, object }).await.context("failed to add binding")?;
            success(&format!("bound {BOLD}{claim}:{value}{RESET} to role {BOLD}{role}{RESET} ({effect})"));
        }
        RoleBindingCommands::Remove { claim, value, role, cluster, namespace, project, component, effect } => {
            let (kind, object) = role_binding_object(&claim, &value, &role, cluster, namespace.as_deref(), project.as_deref(), component.as_deref(), &effect)?;
            sync::try_handle_event(&store, &Event::Deleted { kind, object, tombstone: false }).await.context("failed to remove binding")?;
            success(&format!("removed binding {BOLD}{claim}:{value}{RESET} -> role {BOLD}{role}{RESET}"));
        }
    }
    Ok(())
}

fn build_request(
    claim: String,
    values: Vec<String>,
    namespace: Option<String>,
    project: Option<String>,
    component: Option<String>,
    action: String,
    context: String,
) -> EvaluateRequest {
    EvaluateRequest {
        subject_context: authz_core::subject::SubjectContext { subject_type: "user".to_string(), claim, values },
        resource: ResourceRef { resource_type: "Resource".to_string(), id: None, hierarchy: ResourceHierarchy::new(namespace, project, component) },
        action,
        context,
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_evaluate(
    data_file: &str,
    claim: String,
    values: Vec<String>,
    namespace: Option<String>,
    project: Option<String>,
    component: Option<String>,
    action: String,
    context: String,
) -> Result<()> {
    let store = open_store(data_file).await?;
    let request = build_request(claim, values, namespace, project, component, action, context);
    let decision = pdp::evaluate(&store, &request).await.context("evaluate failed")?;

    if decision.allowed {
        success(&format!("allow — {}", decision.reason));
    } else {
        println!("{RED}{BOLD}✗{RESET} deny — {}", decision.reason);
    }
    Ok(())
}

#[derive(serde::Deserialize)]
struct BatchRequestDto {
    claim: String,
    values: Vec<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    component: Option<String>,
    action: String,
    #[serde(default)]
    context: String,
}

async fn cmd_batch_evaluate(data_file: &str, file: &str) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("failed to read '{file}'"))?;
    let dtos: Vec<BatchRequestDto> = serde_json::from_str(&content).context("file is not a JSON array of requests")?;

    let store = open_store(data_file).await?;
    let requests: Vec<EvaluateRequest> =
        dtos.into_iter().map(|d| build_request(d.claim, d.values, d.namespace, d.project, d.component, d.action, d.context)).collect();

    let cancelled = std::sync::atomic::AtomicBool::new(false);
    let results = pdp::batch_evaluate(&store, &requests, CancellationToken::new(&cancelled)).await.context("batch evaluate failed")?;

    let decisions: Vec<serde_json::Value> = results
        .into_iter()
        .map(|result| match result {
            Ok(decision) => serde_json::json!({ "allowed": decision.allowed, "reason": decision.reason }),
            Err(err) => serde_json::json!({ "allowed": false, "error": err.to_string() }),
        })
        .collect();
    print_json(&serde_json::Value::Array(decisions));
    Ok(())
}

async fn cmd_subject_profile(
    data_file: &str,
    claim: String,
    values: Vec<String>,
    namespace: Option<String>,
    project: Option<String>,
    component: Option<String>,
) -> Result<()> {
    let store = open_store(data_file).await?;
    let request = ProfileRequest {
        subject_context: authz_core::subject::SubjectContext { subject_type: "user".to_string(), claim, values },
        scope: ResourceHierarchy::new(namespace, project, component),
    };
    let cancelled = std::sync::atomic::AtomicBool::new(false);
    let profile = pdp::subject_profile(&store, &request, CancellationToken::new(&cancelled)).await.context("subject profile failed")?;

    let capabilities: serde_json::Map<String, serde_json::Value> = profile
        .capabilities
        .into_iter()
        .map(|(action, cap)| {
            let allowed: Vec<&str> = cap.allowed.iter().map(|r| r.path.as_str()).collect();
            let denied: Vec<&str> = cap.denied.iter().map(|r| r.path.as_str()).collect();
            (action, serde_json::json!({ "allowed": allowed, "denied": denied }))
        })
        .collect();

    print_json(&serde_json::json!({
        "user": profile.user,
        "generated_at": profile.generated_at,
        "capabilities": capabilities,
    }));
    Ok(())
}
