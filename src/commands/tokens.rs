use clap::Args;

use stackops::stack::Stack;
use stackops::tokens::{self, KeyVaultStore, TokenOutcome, TokenRequest};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct TokensArgs {
    /// Environment code used to locate key_vault_name in the workload tfvars
    #[arg(long, default_value = "dev")]
    pub env: String,

    /// Key vault name. Defaults to key_vault_name in the workload tfvars.
    #[arg(long)]
    pub vault_name: Option<String>,

    /// Secret holding the token list (name:token;name:token)
    #[arg(long)]
    pub secret_name: Option<String>,

    /// Add a token in name:token form (repeatable)
    #[arg(long, value_name = "NAME:TOKEN")]
    pub add: Vec<String>,

    /// Token name to remove (repeatable)
    #[arg(long, value_name = "NAME")]
    pub remove: Vec<String>,

    /// Generate a token by name, or N tokens named generated-<n> (repeatable)
    #[arg(long, value_name = "NAME|N")]
    pub generate: Vec<String>,

    /// List tokens without modifying (ignored if add/remove/generate given)
    #[arg(long)]
    pub list: bool,
}

pub fn run(args: TokensArgs, global: &crate::commands::GlobalArgs) -> CmdResult<TokenOutcome> {
    let (settings, runner) = super::prepare(global, |s| vec![s.tools.az.clone()])?;
    let token_settings = settings.tokens.clone();
    let az = settings.tools.az.clone();

    let vault = match args.vault_name.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(vault) => vault.to_string(),
        None => {
            let ctx = super::deploy_context(global, &args.env, settings, &runner)?;
            let var_file = Stack::workload(&ctx, &runner).seed_variables()?;
            tokens::resolve_vault(None, &var_file, &token_settings.vault_key)?
        }
    };
    let secret = args
        .secret_name
        .clone()
        .unwrap_or_else(|| token_settings.secret_name.clone());

    let request = TokenRequest {
        add: args.add,
        remove: args.remove,
        generate: args.generate,
        list_only: args.list,
    };
    let store = KeyVaultStore::new(&runner, az);
    let outcome = tokens::apply(&store, &vault, &secret, &request, token_settings.token_length)?;
    Ok((outcome, 0))
}
