use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::context::DeployContext;
use crate::defaults::ImageConfig;
use crate::error::{Error, Result};
use crate::executor::{CommandRunner, CommandSpec, EchoPolicy, RunOptions};
use crate::git;
use crate::utils::io;
use crate::varfile;

/// Variable-file key that remembers the registry between runs.
pub const REGISTRY_VAR_KEY: &str = "registry_login_server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Submit the staged context to the managed build service.
    #[default]
    Remote,
    /// Build and push with the local container tool.
    Local,
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Variable file that receives the registry and image reference.
    pub var_file: PathBuf,
    pub mode: BuildMode,
    pub registry_override: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub image: String,
    pub registry_login_server: String,
    pub registry_name: String,
    pub tag: String,
    pub mode: BuildMode,
    pub var_file: String,
}

// === Registry Resolution ===

fn usable(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty() && !value.contains('<')).then(|| value.to_string())
}

/// Resolve the registry endpoint using the following priority:
/// 1. Explicit override (command line)
/// 2. Environment overrides, in their configured order
/// 3. The value previously recorded in the variable file
///
/// Empty values and unfilled `<placeholder>` values are skipped.
pub fn resolve_registry_endpoint(
    explicit: Option<&str>,
    env_candidates: &[String],
    var_file: &Path,
) -> Result<String> {
    if let Some(found) = explicit
        .into_iter()
        .chain(env_candidates.iter().map(String::as_str))
        .find_map(usable)
    {
        return Ok(found);
    }

    varfile::lookup_file(var_file, REGISTRY_VAR_KEY)?
        .as_deref()
        .and_then(usable)
        .ok_or_else(Error::registry_endpoint_required)
}

/// Registry name is the first DNS label of its login server.
pub fn registry_name(endpoint: &str) -> &str {
    endpoint.split('.').next().unwrap_or(endpoint)
}

// === Build Context Staging ===

/// Copy the build template and every include path from `root` into a fresh
/// temporary directory. The directory is removed when the handle drops.
pub fn stage_context(root: &Path, image: &ImageConfig) -> Result<TempDir> {
    let template = root.join(&image.build_template);
    if !template.is_file() {
        return Err(Error::missing_build_template(template.display().to_string()));
    }

    for rel in &image.include_paths {
        if !root.join(rel).exists() {
            return Err(Error::missing_include_path(rel.clone()));
        }
    }

    let staged = tempfile::Builder::new()
        .prefix(&format!("{}-ctx-", image.target))
        .tempdir()
        .map_err(|e| Error::internal_io(e.to_string(), Some("create build context".to_string())))?;

    io::copy_path(&template, &staged.path().join(&image.build_template))?;
    for rel in &image.include_paths {
        io::copy_path(&root.join(rel), &staged.path().join(rel))?;
    }

    let context_dir = staged.path().join(&image.build_context);
    if !context_dir.is_dir() {
        return Err(Error::missing_build_context(
            &image.target,
            context_dir.display().to_string(),
        ));
    }

    log_status!(
        "build",
        "Staged {} path(s) into {}",
        image.include_paths.len(),
        staged.path().display()
    );
    Ok(staged)
}

// === Build Execution ===

fn build_local(
    runner: &dyn CommandRunner,
    ctx: &DeployContext,
    staged: &Path,
    endpoint: &str,
    image: &str,
) -> Result<()> {
    let tools = &ctx.settings.tools;
    let cfg = &ctx.settings.image;

    if endpoint.ends_with(&cfg.managed_registry_suffix) {
        runner.run(
            &CommandSpec::new(&tools.az).args(["acr", "login", "--name", registry_name(endpoint)]),
            RunOptions::streamed(),
        )?;
    }

    let dockerfile = staged.join(&cfg.dockerfile);
    let context_dir = staged.join(&cfg.build_context);
    runner.run(
        &CommandSpec::new(&tools.docker).args([
            "build".to_string(),
            "--platform".to_string(),
            cfg.platform.clone(),
            "-t".to_string(),
            image.to_string(),
            "-f".to_string(),
            dockerfile.display().to_string(),
            context_dir.display().to_string(),
        ]),
        RunOptions::streamed(),
    )?;
    runner.run(
        &CommandSpec::new(&tools.docker).args(["push", image]),
        RunOptions::streamed(),
    )?;
    Ok(())
}

fn build_remote(
    runner: &dyn CommandRunner,
    ctx: &DeployContext,
    staged: &Path,
    registry: &str,
    image: &str,
) -> Result<()> {
    let cfg = &ctx.settings.image;
    runner.run(
        &CommandSpec::new(&ctx.settings.tools.az).args([
            "acr".to_string(),
            "run".to_string(),
            "-f".to_string(),
            cfg.build_template.clone(),
            "--registry".to_string(),
            registry.to_string(),
            "--set".to_string(),
            format!("image={}", image),
            "--set".to_string(),
            format!("dockerfile={}", cfg.dockerfile),
            "--set".to_string(),
            format!("platform={}", cfg.platform),
            "--set".to_string(),
            format!("context={}", cfg.build_context),
            staged.display().to_string(),
        ]),
        RunOptions::captured(EchoPolicy::Always),
    )?;
    Ok(())
}

/// Build the configured image, push it, and record the result in the
/// request's variable file.
pub fn publish(
    ctx: &DeployContext,
    runner: &dyn CommandRunner,
    request: &PublishRequest,
    now: DateTime<Utc>,
) -> Result<PublishReport> {
    let cfg = &ctx.settings.image;

    let endpoint = resolve_registry_endpoint(
        request.registry_override.as_deref(),
        &ctx.overrides.registry_endpoints,
        &request.var_file,
    )?;
    let registry = registry_name(&endpoint).to_string();

    let repository = ctx
        .overrides
        .image_repository
        .clone()
        .unwrap_or_else(|| cfg.repository_prefix.clone());
    let tag = match &ctx.overrides.image_tag {
        Some(tag) => tag.clone(),
        None => git::derive_image_tag(runner, &ctx.settings.tools.git, &ctx.root, now),
    };
    let full_image = format!("{}/{}:{}", endpoint, repository, tag);

    let staged = stage_context(&ctx.root, cfg)?;
    match request.mode {
        BuildMode::Local => build_local(runner, ctx, staged.path(), &endpoint, &full_image)?,
        BuildMode::Remote => {
            let remote_image = format!("{}:{}", repository, tag);
            build_remote(runner, ctx, staged.path(), &registry, &remote_image)?
        }
    }
    drop(staged);

    varfile::update_file(
        &request.var_file,
        &[
            (REGISTRY_VAR_KEY, endpoint.as_str()),
            (cfg.var_key.as_str(), full_image.as_str()),
        ],
    )?;
    log_status!("build", "Published {}", full_image);

    Ok(PublishReport {
        image: full_image,
        registry_login_server: endpoint,
        registry_name: registry,
        tag,
        mode: request.mode,
        var_file: request.var_file.display().to_string(),
    })
}
