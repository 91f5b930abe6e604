//! Filesystem layout of the two stacks.

use std::path::{Path, PathBuf};

use crate::defaults::StacksConfig;

/// Where the upstream (bootstrap) and downstream (workload) stacks live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackPaths {
    pub root: PathBuf,
    pub bootstrap: PathBuf,
    pub workload: PathBuf,
    state_dir: String,
    state_file: String,
    var_file_extension: String,
}

impl StackPaths {
    pub fn resolve(root: &Path, config: &StacksConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            bootstrap: root.join(&config.bootstrap),
            workload: root.join(&config.workload),
            state_dir: config.state_dir.clone(),
            state_file: config.state_file.clone(),
            var_file_extension: config.var_file_extension.clone(),
        }
    }

    /// Local state file the bootstrap stack keeps for `env`.
    pub fn bootstrap_state(&self, env: &str) -> PathBuf {
        self.bootstrap
            .join(&self.state_dir)
            .join(env)
            .join(&self.state_file)
    }

    /// `<stack>/<env>.<ext>`
    pub fn var_file(&self, stack_dir: &Path, env: &str) -> PathBuf {
        stack_dir.join(format!("{}.{}", env, self.var_file_extension))
    }

    /// Example files that may seed a missing variable file, in preference order.
    pub fn example_candidates(&self, stack_dir: &Path, env: &str) -> Vec<PathBuf> {
        let ext = &self.var_file_extension;
        vec![
            stack_dir.join(format!("terraform.{}.{}.example", ext, env)),
            stack_dir.join(format!("{}.{}.example", env, ext)),
            stack_dir.join(format!("terraform.{}.example", ext)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> StackPaths {
        StackPaths::resolve(Path::new("/repo"), &StacksConfig::default())
    }

    #[test]
    fn bootstrap_state_is_per_environment() {
        assert_eq!(
            paths().bootstrap_state("dev"),
            PathBuf::from("/repo/infra/terraform/stacks/00-bootstrap/.state/dev/bootstrap.tfstate")
        );
    }

    #[test]
    fn example_candidates_prefer_environment_specific_names() {
        let p = paths();
        let names: Vec<String> = p
            .example_candidates(&p.workload, "prod")
            .iter()
            .map(|c| c.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "terraform.tfvars.prod.example",
                "prod.tfvars.example",
                "terraform.tfvars.example"
            ]
        );
    }

    #[test]
    fn var_file_uses_configured_extension() {
        let p = paths();
        assert_eq!(
            p.var_file(&p.workload, "dev"),
            PathBuf::from("/repo/infra/terraform/stacks/20-workload/dev.tfvars")
        );
    }
}
