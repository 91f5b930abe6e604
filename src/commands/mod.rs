use std::path::PathBuf;

use stackops::context::{DeployContext, Environment, Overrides};
use stackops::defaults::{self, Settings};
use stackops::executor::{self, ProcessRunner};

pub type CmdResult<T> = stackops::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    /// Repository root every stack path is resolved against.
    pub root: PathBuf,
}

/// Settings plus a real process runner, after checking `tools` are on PATH.
pub(crate) fn prepare(
    global: &GlobalArgs,
    tools: impl Fn(&Settings) -> Vec<String>,
) -> stackops::Result<(Settings, ProcessRunner)> {
    let settings = defaults::load_settings(&global.root)?;
    let required = tools(&settings);
    let names: Vec<&str> = required.iter().map(String::as_str).collect();
    executor::require_binaries(&names)?;
    Ok((settings, ProcessRunner::new()))
}

/// Resolve identity and assemble the per-run context.
pub(crate) fn deploy_context(
    global: &GlobalArgs,
    env: &str,
    settings: Settings,
    runner: &ProcessRunner,
) -> stackops::Result<DeployContext> {
    let environment = Environment::parse(env)?;
    DeployContext::resolve(
        &global.root,
        environment,
        settings,
        Overrides::from_env(),
        runner,
    )
}

pub mod bootstrap;
pub mod publish;
pub mod tokens;
pub mod workload;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (stackops::Result<serde_json::Value>, i32) {
    crate::tty::status("stackops is working...");

    match command {
        crate::Commands::Bootstrap(args) => dispatch!(args, global, bootstrap),
        crate::Commands::Workload(args) => dispatch!(args, global, workload),
        crate::Commands::Publish(args) => dispatch!(args, global, publish),
        crate::Commands::Tokens(args) => dispatch!(args, global, tokens),
    }
}
