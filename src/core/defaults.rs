use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::io;

/// Repository-level settings file, read from the repository root.
pub const SETTINGS_FILE: &str = "stackops.json";

/// Root configuration structure for stackops.json
///
/// Every field is optional; anything absent falls back to the values the
/// deployment scripts have always used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub stacks: StacksConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub tokens: TokensConfig,

    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stacks: StacksConfig::default(),
            tools: ToolsConfig::default(),
            image: ImageConfig::default(),
            tokens: TokensConfig::default(),
            endpoints: default_endpoints(),
        }
    }
}

/// Stack directories and local state layout, relative to the repository root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StacksConfig {
    pub bootstrap: String,
    pub workload: String,
    /// Directory under the bootstrap stack holding `<env>/<state_file>`.
    pub state_dir: String,
    pub state_file: String,
    pub var_file_extension: String,
}

impl Default for StacksConfig {
    fn default() -> Self {
        Self {
            bootstrap: "infra/terraform/stacks/00-bootstrap".to_string(),
            workload: "infra/terraform/stacks/20-workload".to_string(),
            state_dir: ".state".to_string(),
            state_file: "bootstrap.tfstate".to_string(),
            var_file_extension: "tfvars".to_string(),
        }
    }
}

/// Binary names for the external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub terraform: String,
    pub az: String,
    pub docker: String,
    pub git: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            terraform: "terraform".to_string(),
            az: "az".to_string(),
            docker: "docker".to_string(),
            git: "git".to_string(),
        }
    }
}

/// What gets built and where the result is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub target: String,
    pub repository_prefix: String,
    pub platform: String,
    pub build_template: String,
    pub managed_registry_suffix: String,
    pub dockerfile: String,
    pub build_context: String,
    pub include_paths: Vec<String>,
    pub var_key: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            target: "az-reader".to_string(),
            repository_prefix: "az-reader".to_string(),
            platform: "linux/amd64".to_string(),
            build_template: "acr-build.yaml".to_string(),
            managed_registry_suffix: ".azurecr.io".to_string(),
            dockerfile: "Dockerfile".to_string(),
            build_context: ".".to_string(),
            include_paths: [
                "Dockerfile",
                "package.json",
                "package-lock.json",
                "build",
                "public",
                "licensed",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            var_key: "container_image".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    pub secret_name: String,
    pub token_length: usize,
    /// Workload variable holding the vault name.
    pub vault_key: String,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            secret_name: "self-host-tokens".to_string(),
            token_length: 64,
            vault_key: "key_vault_name".to_string(),
        }
    }
}

/// A workload output that names a public endpoint worth reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    pub output: String,
    pub label: String,
    #[serde(default)]
    pub path: String,
}

fn default_endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig {
            output: "crawl_container_app_fqdn".to_string(),
            label: "Crawl app".to_string(),
            path: "/".to_string(),
        },
        EndpointConfig {
            output: "search_container_app_fqdn".to_string(),
            label: "Search app".to_string(),
            path: "/search".to_string(),
        },
    ]
}

/// Load settings from `<root>/stackops.json`. A missing file means defaults;
/// a malformed one is an error.
pub fn load_settings(root: &Path) -> Result<Settings> {
    let path = root.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = io::read_file(&path, &format!("read {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;

    if settings.tokens.token_length == 0 {
        return Err(Error::config_invalid_value(
            "tokens.token_length",
            Some("0".to_string()),
            "generated tokens need at least one character",
        ));
    }
    Ok(settings)
}
