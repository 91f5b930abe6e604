//! Lifecycle of a single provisioning stack.
//!
//! A [`Stack`] moves `unconfigured → variables-seeded → backend-initialized →
//! planned → applied` within one invocation. Operations called out of order
//! fail with `stack.phase_violation` before anything runs.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::context::DeployContext;
use crate::defaults::EndpointConfig;
use crate::error::{Error, Result};
use crate::executor::{CommandRunner, CommandSpec, EchoPolicy, RunOptions};
use crate::utils::io;
use crate::varfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackPhase {
    Unconfigured,
    VariablesSeeded,
    BackendInitialized,
    Planned,
    Applied,
}

impl StackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackPhase::Unconfigured => "unconfigured",
            StackPhase::VariablesSeeded => "variables-seeded",
            StackPhase::BackendInitialized => "backend-initialized",
            StackPhase::Planned => "planned",
            StackPhase::Applied => "applied",
        }
    }
}

/// Remote state coordinates published by the bootstrap stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapState {
    pub resource_group: String,
    pub storage_account: String,
    pub container: String,
    pub blob_key: String,
}

impl BootstrapState {
    pub fn from_outputs(outputs: &StackOutputs) -> Result<Self> {
        Ok(Self {
            resource_group: outputs.require("state_rg_name")?,
            storage_account: outputs.require("state_storage_account_name")?,
            container: outputs.require("state_container_name")?,
            blob_key: outputs.require("state_blob_key")?,
        })
    }

    /// Workload variables that mirror these coordinates.
    pub fn variable_updates(&self) -> [(&'static str, &str); 4] {
        [
            ("state_resource_group_name", self.resource_group.as_str()),
            ("state_storage_account_name", self.storage_account.as_str()),
            ("state_container_name", self.container.as_str()),
            ("state_blob_key", self.blob_key.as_str()),
        ]
    }
}

/// Decoded `output -json`: `{ name: { value, ... } }`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackOutputs(serde_json::Map<String, Value>);

impl StackOutputs {
    pub fn parse(json: &str) -> Result<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(trimmed)
            .map(Self)
            .map_err(|e| Error::internal_json(e.to_string(), Some("parse stack outputs".to_string())))
    }

    /// The output's `value` as text. Non-string scalars are rendered as JSON.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.0.get(key)?.get("value")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| Error::missing_stack_output(key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub label: String,
    pub url: String,
}

/// Scheme-qualify a host unless it already carries one.
pub fn normalize_url(value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!("https://{}", value)
    }
}

/// Recognized endpoints present in `outputs`, in configuration order.
pub fn endpoints(outputs: &StackOutputs, recognized: &[EndpointConfig]) -> Vec<Endpoint> {
    recognized
        .iter()
        .filter_map(|cfg| {
            let value = outputs.get(&cfg.output).filter(|v| !v.is_empty())?;
            Some(Endpoint {
                label: cfg.label.clone(),
                url: format!("{}{}", normalize_url(&value), cfg.path),
            })
        })
        .collect()
}

pub struct Stack<'a> {
    name: String,
    dir: PathBuf,
    ctx: &'a DeployContext,
    runner: &'a dyn CommandRunner,
    phase: StackPhase,
    var_file: Option<PathBuf>,
}

impl<'a> Stack<'a> {
    pub fn new(dir: PathBuf, ctx: &'a DeployContext, runner: &'a dyn CommandRunner) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| dir.display().to_string());
        Self {
            name,
            dir,
            ctx,
            runner,
            phase: StackPhase::Unconfigured,
            var_file: None,
        }
    }

    pub fn bootstrap(ctx: &'a DeployContext, runner: &'a dyn CommandRunner) -> Self {
        Self::new(ctx.paths().bootstrap, ctx, runner)
    }

    pub fn workload(ctx: &'a DeployContext, runner: &'a dyn CommandRunner) -> Self {
        Self::new(ctx.paths().workload, ctx, runner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn phase(&self) -> StackPhase {
        self.phase
    }

    pub fn var_file(&self) -> Option<&Path> {
        self.var_file.as_deref()
    }

    fn guard(&self, operation: &str, allowed: &[StackPhase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(Error::stack_phase_violation(
                &self.name,
                operation,
                self.phase.as_str(),
            ))
        }
    }

    fn seeded_var_file(&self, operation: &str) -> Result<String> {
        self.var_file
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                Error::stack_phase_violation(&self.name, operation, "missing its variable file")
            })
    }

    fn terraform<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(&self.ctx.settings.tools.terraform)
            .args(args)
            .cwd(&self.dir)
            .envs(self.ctx.tool_env())
    }

    /// Ensure `<env>.<ext>` exists (copying the first available example) and
    /// write the current identity and environment code into it.
    pub fn seed_variables(&mut self) -> Result<PathBuf> {
        self.guard("seed variables", &[StackPhase::Unconfigured])?;

        let env = self.ctx.env();
        let paths = self.ctx.paths();
        let target = paths.var_file(&self.dir, env);

        if !target.exists() {
            let candidates = paths.example_candidates(&self.dir, env);
            let example = candidates.iter().find(|c| c.is_file()).ok_or_else(|| {
                Error::missing_variable_template(
                    env,
                    &self.dir.display().to_string(),
                    candidates.iter().map(|c| c.display().to_string()).collect(),
                )
            })?;
            let content = io::read_file(example, "read variable example")?;
            io::write_file_atomic(&target, &content, "seed variable file")?;
            log_status!(
                "stack",
                "Seeded variables for {} from {}",
                env,
                example.file_name().unwrap_or_default().to_string_lossy()
            );
        }

        let identity = &self.ctx.identity;
        varfile::update_file(
            &target,
            &[
                ("subscription_id", identity.subscription_id.as_str()),
                ("tenant_id", identity.tenant_id.as_str()),
                ("environment_code", env),
            ],
        )?;
        log_status!(
            "stack",
            "Updated {} with subscription_id, tenant_id, and environment_code",
            target.file_name().unwrap_or_default().to_string_lossy()
        );

        self.var_file = Some(target.clone());
        self.phase = StackPhase::VariablesSeeded;
        Ok(target)
    }

    /// Point the backend at a local state file, creating its directory.
    pub fn init_local(&mut self, state_path: &Path) -> Result<()> {
        self.guard(
            "init",
            &[StackPhase::Unconfigured, StackPhase::VariablesSeeded],
        )?;

        let state_path = std::path::absolute(state_path).map_err(|e| {
            Error::internal_io(e.to_string(), Some("resolve state path".to_string()))
        })?;
        if let Some(parent) = state_path.parent() {
            io::ensure_dir(parent, "create state directory")?;
        }

        self.runner.run(
            &self.terraform([
                "init".to_string(),
                "-reconfigure".to_string(),
                format!("-backend-config=path={}", state_path.display()),
            ]),
            RunOptions::streamed(),
        )?;
        self.phase = StackPhase::BackendInitialized;
        Ok(())
    }

    /// Point the backend at the remote blob named by `state`.
    pub fn init_remote(&mut self, state: &BootstrapState) -> Result<()> {
        self.guard(
            "init",
            &[StackPhase::Unconfigured, StackPhase::VariablesSeeded],
        )?;

        self.runner.run(
            &self.terraform([
                "init".to_string(),
                "-reconfigure".to_string(),
                "-backend-config=use_azuread_auth=true".to_string(),
                format!("-backend-config=tenant_id={}", self.ctx.identity.tenant_id),
                format!("-backend-config=resource_group_name={}", state.resource_group),
                format!("-backend-config=storage_account_name={}", state.storage_account),
                format!("-backend-config=container_name={}", state.container),
                format!("-backend-config=key={}", state.blob_key),
            ]),
            RunOptions::streamed(),
        )?;
        self.phase = StackPhase::BackendInitialized;
        Ok(())
    }

    pub fn plan(&mut self, extra: &[String]) -> Result<()> {
        self.guard("plan", &[StackPhase::BackendInitialized])?;
        let var_file = self.seeded_var_file("plan")?;

        let mut args = vec!["plan".to_string(), format!("-var-file={}", var_file)];
        args.extend(extra.iter().cloned());
        self.runner.run(&self.terraform(args), RunOptions::streamed())?;

        self.phase = StackPhase::Planned;
        Ok(())
    }

    pub fn apply(&mut self, extra: &[String], auto_approve: bool) -> Result<()> {
        self.guard("apply", &[StackPhase::Planned])?;
        let var_file = self.seeded_var_file("apply")?;

        let mut args = vec!["apply".to_string(), format!("-var-file={}", var_file)];
        if auto_approve {
            args.push("--auto-approve".to_string());
        }
        args.extend(extra.iter().cloned());
        self.runner.run(&self.terraform(args), RunOptions::streamed())?;

        self.phase = StackPhase::Applied;
        Ok(())
    }

    pub fn outputs(&self) -> Result<StackOutputs> {
        self.guard(
            "output",
            &[
                StackPhase::BackendInitialized,
                StackPhase::Planned,
                StackPhase::Applied,
            ],
        )?;
        let output = self.runner.run(
            &self.terraform(["output", "-json"]),
            RunOptions::captured(EchoPolicy::OnError),
        )?;
        StackOutputs::parse(&output.stdout)
    }
}

/// Initialize the bootstrap stack against its local state and read the
/// remote-state coordinates it published.
///
/// Fails with `stack.upstream_not_bootstrapped` without running anything when
/// the local state file does not exist.
pub fn load_bootstrap_state(
    ctx: &DeployContext,
    runner: &dyn CommandRunner,
) -> Result<BootstrapState> {
    let state_path = require_bootstrap_state(ctx)?;
    let mut bootstrap = Stack::bootstrap(ctx, runner);
    bootstrap.init_local(&state_path)?;
    BootstrapState::from_outputs(&bootstrap.outputs()?)
}

/// Path of the bootstrap state file, or `stack.upstream_not_bootstrapped`.
pub fn require_bootstrap_state(ctx: &DeployContext) -> Result<PathBuf> {
    let state_path = ctx.paths().bootstrap_state(ctx.env());
    if state_path.is_file() {
        Ok(state_path)
    } else {
        Err(Error::upstream_not_bootstrapped(
            ctx.env(),
            &state_path.display().to_string(),
        ))
    }
}
