use clap::Args;
use stackops::build::BuildMode;
use stackops::deploy::{self, WorkloadOptions, WorkloadReport};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct WorkloadArgs {
    /// Environment code (e.g. dev, prod). Selects <env>.tfvars files.
    pub env: String,

    /// Build with the local container tool instead of the managed build service
    #[arg(long)]
    pub local_docker: bool,

    /// Registry login server (e.g. myacr.azurecr.io). Overrides tfvars/env.
    #[arg(long, value_name = "SERVER")]
    pub registry_login_server: Option<String>,

    /// Extra arguments passed to both plan and apply
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub passthrough: Vec<String>,
}

/// Build options recognized anywhere in the passthrough arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Passthrough {
    pub local_docker: bool,
    pub registry_login_server: Option<String>,
    pub rest: Vec<String>,
}

/// Hoist `--local-docker` and `--registry-login-server <v>` out of `args`.
/// A trailing `--registry-login-server` with no value is dropped.
pub fn split_passthrough(args: &[String]) -> Passthrough {
    let mut split = Passthrough::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--local-docker" => split.local_docker = true,
            "--registry-login-server" => {
                if let Some(value) = iter.next() {
                    split.registry_login_server = Some(value.clone());
                }
            }
            _ => split.rest.push(arg.clone()),
        }
    }
    split
}

pub fn run(args: WorkloadArgs, global: &crate::commands::GlobalArgs) -> CmdResult<WorkloadReport> {
    let hoisted = split_passthrough(&args.passthrough);
    let local_docker = args.local_docker || hoisted.local_docker;
    let registry_override = hoisted.registry_login_server.or(args.registry_login_server);

    let (settings, runner) = super::prepare(global, |s| {
        let mut tools = vec![s.tools.az.clone(), s.tools.terraform.clone()];
        if local_docker {
            tools.push(s.tools.docker.clone());
        }
        tools
    })?;
    let ctx = super::deploy_context(global, &args.env, settings, &runner)?;

    let options = WorkloadOptions {
        mode: if local_docker {
            BuildMode::Local
        } else {
            BuildMode::Remote
        },
        registry_override,
        extra_args: hoisted.rest,
    };
    let report = deploy::deploy_workload(&ctx, &runner, &options, chrono::Utc::now())?;
    Ok((report, 0))
}
