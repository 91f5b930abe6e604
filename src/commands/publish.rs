use clap::Args;
use std::path::PathBuf;

use stackops::build::{self, BuildMode, PublishReport, PublishRequest};
use stackops::stack::Stack;

use crate::commands::CmdResult;

#[derive(Args)]
pub struct PublishArgs {
    /// Environment code (e.g. dev, prod)
    pub env: String,

    /// Build locally with the container tool
    #[arg(long)]
    pub local_docker: bool,

    /// Registry login server (e.g. myacr.azurecr.io). Overrides tfvars/env.
    #[arg(long, value_name = "SERVER")]
    pub registry_login_server: Option<String>,

    /// Variable file to update (defaults to the workload stack's <env>.tfvars)
    #[arg(long, value_name = "PATH")]
    pub tfvars: Option<String>,
}

pub fn run(args: PublishArgs, global: &crate::commands::GlobalArgs) -> CmdResult<PublishReport> {
    let (settings, runner) = super::prepare(global, |s| {
        let mut tools = vec![s.tools.az.clone()];
        if args.local_docker {
            tools.push(s.tools.docker.clone());
        }
        tools
    })?;
    let ctx = super::deploy_context(global, &args.env, settings, &runner)?;

    let var_file = match &args.tfvars {
        Some(path) => PathBuf::from(shellexpand::tilde(path).into_owned()),
        None => Stack::workload(&ctx, &runner).seed_variables()?,
    };

    let request = PublishRequest {
        var_file,
        mode: if args.local_docker {
            BuildMode::Local
        } else {
            BuildMode::Remote
        },
        registry_override: args.registry_login_server.clone(),
    };
    let report = build::publish(&ctx, &runner, &request, chrono::Utc::now())?;
    Ok((report, 0))
}
