use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::build::{self, BuildMode, PublishReport, PublishRequest};
use crate::context::DeployContext;
use crate::error::Result;
use crate::executor::CommandRunner;
use crate::stack::{self, BootstrapState, Endpoint, Stack, StackPhase};
use crate::varfile;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    pub environment: String,
    pub stack: String,
    pub var_file: String,
    pub state_path: String,
    pub phase: StackPhase,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadReport {
    pub environment: String,
    pub stack: String,
    pub var_file: String,
    pub image: PublishReport,
    pub bootstrap_state: BootstrapState,
    pub endpoints: Vec<Endpoint>,
    pub phase: StackPhase,
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadOptions {
    pub mode: BuildMode,
    pub registry_override: Option<String>,
    /// Passed unchanged to plan and apply.
    pub extra_args: Vec<String>,
}

/// Seed, initialize against local state, plan and apply the bootstrap stack.
pub fn deploy_bootstrap(ctx: &DeployContext, runner: &dyn CommandRunner) -> Result<BootstrapReport> {
    let state_path = ctx.paths().bootstrap_state(ctx.env());
    let mut stack = Stack::bootstrap(ctx, runner);
    let var_file = stack.seed_variables()?;

    log_status!("deploy", "==> {} ({})", stack.name(), ctx.env());
    stack.init_local(&state_path)?;
    stack.plan(&[])?;
    stack.apply(&[], true)?;

    Ok(BootstrapReport {
        environment: ctx.env().to_string(),
        stack: stack.name().to_string(),
        var_file: var_file.display().to_string(),
        state_path: state_path.display().to_string(),
        phase: stack.phase(),
    })
}

/// Publish the image and roll out the workload stack on top of the
/// bootstrap stack's remote state.
///
/// Nothing is built or initialized unless the bootstrap state for the
/// environment already exists.
pub fn deploy_workload(
    ctx: &DeployContext,
    runner: &dyn CommandRunner,
    options: &WorkloadOptions,
    now: DateTime<Utc>,
) -> Result<WorkloadReport> {
    stack::require_bootstrap_state(ctx)?;

    let mut workload = Stack::workload(ctx, runner);
    let var_file = workload.seed_variables()?;

    let image = build::publish(
        ctx,
        runner,
        &PublishRequest {
            var_file: var_file.clone(),
            mode: options.mode,
            registry_override: options.registry_override.clone(),
        },
        now,
    )?;

    let bootstrap_state = stack::load_bootstrap_state(ctx, runner)?;
    varfile::update_file(&var_file, &bootstrap_state.variable_updates())?;

    log_status!("deploy", "==> {} ({})", workload.name(), ctx.env());
    workload.init_remote(&bootstrap_state)?;
    workload.plan(&options.extra_args)?;
    workload.apply(&options.extra_args, true)?;

    let endpoints = stack::endpoints(&workload.outputs()?, &ctx.settings.endpoints);
    log_status!("deploy", "==> Deployment outputs");
    for endpoint in &endpoints {
        log_status!("deploy", "{}: {}", endpoint.label, endpoint.url);
    }

    Ok(WorkloadReport {
        environment: ctx.env().to_string(),
        stack: workload.name().to_string(),
        var_file: var_file.display().to_string(),
        image,
        bootstrap_state,
        endpoints,
        phase: workload.phase(),
    })
}
