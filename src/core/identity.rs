//! Subscription/tenant identity for the current run.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::executor::{CommandRunner, CommandSpec, EchoPolicy, RunOptions};

/// Environment variables consulted before asking the CLI, primary first.
pub const SUBSCRIPTION_VARS: [&str; 2] = ["AZURE_SUBSCRIPTION_ID", "ARM_SUBSCRIPTION_ID"];
pub const TENANT_VARS: [&str; 2] = ["AZURE_TENANT_ID", "ARM_TENANT_ID"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub subscription_id: String,
    pub tenant_id: String,
}

/// Identity values supplied by the environment, captured once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityOverrides {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
}

impl IdentityOverrides {
    /// Collect overrides through `lookup`, taking the first non-empty value
    /// of each variable list.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };
        Self {
            subscription_id: first(&SUBSCRIPTION_VARS),
            tenant_id: first(&TENANT_VARS),
        }
    }

    fn complete(&self) -> Option<Identity> {
        match (&self.subscription_id, &self.tenant_id) {
            (Some(subscription_id), Some(tenant_id)) => Some(Identity {
                subscription_id: subscription_id.clone(),
                tenant_id: tenant_id.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct AccountShow {
    id: Option<String>,
    #[serde(rename = "tenantId")]
    tenant_id: Option<String>,
}

/// Use the environment pair when complete, otherwise ask `az account show`.
///
/// A failing CLI call surfaces as `process.failed`; an unreadable or
/// incomplete response is `identity.resolution_failed`.
pub fn resolve(
    overrides: &IdentityOverrides,
    runner: &dyn CommandRunner,
    az: &str,
) -> Result<Identity> {
    if let Some(identity) = overrides.complete() {
        return Ok(identity);
    }

    let output = runner.run(
        &CommandSpec::new(az).args(["account", "show", "--output", "json"]),
        RunOptions::captured(EchoPolicy::OnError),
    )?;
    parse_account(&output.stdout)
}

fn parse_account(stdout: &str) -> Result<Identity> {
    let account: AccountShow = serde_json::from_str(stdout)
        .map_err(|e| Error::identity_resolution_failed(format!("unreadable account JSON: {}", e)))?;

    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let subscription_id = non_empty(account.id)
        .ok_or_else(|| Error::identity_resolution_failed("account response has no 'id'"))?;
    let tenant_id = non_empty(account.tenant_id)
        .ok_or_else(|| Error::identity_resolution_failed("account response has no 'tenantId'"))?;

    Ok(Identity {
        subscription_id,
        tenant_id,
    })
}
