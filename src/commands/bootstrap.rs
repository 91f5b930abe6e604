use clap::Args;
use stackops::deploy::{self, BootstrapReport};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct BootstrapArgs {
    /// Environment code (e.g. dev, prod). Selects <env>.tfvars and the state path.
    pub env: String,
}

pub fn run(args: BootstrapArgs, global: &crate::commands::GlobalArgs) -> CmdResult<BootstrapReport> {
    let (settings, runner) = super::prepare(global, |s| {
        vec![s.tools.az.clone(), s.tools.terraform.clone()]
    })?;
    let ctx = super::deploy_context(global, &args.env, settings, &runner)?;

    let report = deploy::deploy_bootstrap(&ctx, &runner)?;
    Ok((report, 0))
}
