//! Per-invocation deployment context.
//!
//! Ambient process environment is read once into [`Overrides`]. Stages receive
//! a [`DeployContext`] and only project identity into the environment of the
//! provisioning commands they launch.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::defaults::Settings;
use crate::error::Result;
use crate::executor::CommandRunner;
use crate::identity::{self, Identity, IdentityOverrides};
use crate::paths::StackPaths;
use crate::utils::validation;

/// Registry endpoint variables, highest precedence first.
pub const REGISTRY_ENDPOINT_VARS: [&str; 2] =
    ["AZ_READER_REGISTRY_LOGIN_SERVER", "REGISTRY_LOGIN_SERVER"];
pub const IMAGE_TAG_VAR: &str = "IMAGE_TAG";
pub const IMAGE_REPOSITORY_VAR: &str = "AZ_READER_IMAGE_REPOSITORY_PREFIX";

/// Environment code such as `dev` or `prod`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Environment(String);

impl Environment {
    pub fn parse(code: &str) -> Result<Self> {
        validation::require_slug(code, "env").map(|c| Self(c.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values the operator may supply through environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub identity: IdentityOverrides,
    /// Registry endpoint candidates in precedence order (empty values dropped).
    pub registry_endpoints: Vec<String>,
    pub image_tag: Option<String>,
    pub image_repository: Option<String>,
}

impl Overrides {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            identity: IdentityOverrides::from_lookup(&lookup),
            registry_endpoints: REGISTRY_ENDPOINT_VARS
                .iter()
                .filter_map(|name| non_empty(*name))
                .collect(),
            image_tag: non_empty(IMAGE_TAG_VAR),
            image_repository: non_empty(IMAGE_REPOSITORY_VAR),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

#[derive(Debug, Clone)]
pub struct DeployContext {
    pub root: PathBuf,
    pub environment: Environment,
    pub identity: Identity,
    pub settings: Settings,
    pub overrides: Overrides,
}

impl DeployContext {
    /// Resolve identity once for this run.
    pub fn resolve(
        root: &Path,
        environment: Environment,
        settings: Settings,
        overrides: Overrides,
        runner: &dyn CommandRunner,
    ) -> Result<Self> {
        let identity = identity::resolve(&overrides.identity, runner, &settings.tools.az)?;
        Ok(Self {
            root: root.to_path_buf(),
            environment,
            identity,
            settings,
            overrides,
        })
    }

    pub fn env(&self) -> &str {
        self.environment.as_str()
    }

    pub fn paths(&self) -> StackPaths {
        StackPaths::resolve(&self.root, &self.settings.stacks)
    }

    /// Variables the provisioning tool reads, scoped to each invocation.
    pub fn tool_env(&self) -> Vec<(String, String)> {
        vec![
            (
                "TF_VAR_subscription_id".to_string(),
                self.identity.subscription_id.clone(),
            ),
            ("TF_VAR_tenant_id".to_string(), self.identity.tenant_id.clone()),
            (
                "TF_VAR_environment_code".to_string(),
                self.environment.to_string(),
            ),
            (
                "ARM_SUBSCRIPTION_ID".to_string(),
                self.identity.subscription_id.clone(),
            ),
            ("ARM_TENANT_ID".to_string(), self.identity.tenant_id.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::ScriptedRunner;

    #[test]
    fn environment_rejects_path_like_codes() {
        assert_eq!(Environment::parse("dev").unwrap().as_str(), "dev");
        assert!(Environment::parse("../dev").is_err());
        assert!(Environment::parse("").is_err());
    }

    #[test]
    fn overrides_keep_registry_precedence_and_drop_blanks() {
        let overrides = Overrides::from_lookup(|name| match name {
            "REGISTRY_LOGIN_SERVER" => Some("second.azurecr.io".to_string()),
            "AZ_READER_REGISTRY_LOGIN_SERVER" => Some("first.azurecr.io".to_string()),
            "IMAGE_TAG" => Some(" ".to_string()),
            "AZ_READER_IMAGE_REPOSITORY_PREFIX" => Some("reader".to_string()),
            _ => None,
        });

        assert_eq!(
            overrides.registry_endpoints,
            vec!["first.azurecr.io", "second.azurecr.io"]
        );
        assert_eq!(overrides.image_tag, None);
        assert_eq!(overrides.image_repository.as_deref(), Some("reader"));
    }

    #[test]
    fn resolve_projects_identity_into_tool_env() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().on(
            "az account show",
            r#"{"id": "sub-1", "tenantId": "ten-1"}"#,
        );

        let ctx = DeployContext::resolve(
            dir.path(),
            Environment::parse("dev").unwrap(),
            crate::defaults::load_settings(dir.path()).unwrap(),
            Overrides::default(),
            &runner,
        )
        .unwrap();

        let env = ctx.tool_env();
        assert!(env.contains(&("TF_VAR_environment_code".to_string(), "dev".to_string())));
        assert!(env.contains(&("ARM_SUBSCRIPTION_ID".to_string(), "sub-1".to_string())));
        assert!(env.contains(&("TF_VAR_tenant_id".to_string(), "ten-1".to_string())));
    }
}
