use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{bootstrap, publish, tokens, workload};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "stackops")]
#[command(version = VERSION)]
#[command(about = "Deploy the bootstrap and workload infrastructure stacks")]
struct Cli {
    /// Repository root (defaults to the current directory)
    #[arg(long, global = true, default_value = ".")]
    root: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the bootstrap stack with local state
    Bootstrap(bootstrap::BootstrapArgs),
    /// Build, push, and deploy the workload stack
    Workload(workload::WorkloadArgs),
    /// Build and push the container image, recording it in tfvars
    Publish(publish::PublishArgs),
    /// Manage access tokens stored in the key vault
    Tokens(tokens::TokensArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs {
        root: PathBuf::from(shellexpand::tilde(&cli.root).into_owned()),
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(exit_code_to_u8(1));
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
