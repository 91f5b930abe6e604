//! Scripted stand-in for external tools.

use std::cell::RefCell;

use crate::error::{Error, ProcessFailedDetails, Result};
use crate::executor::{CommandOutput, CommandRunner, CommandSpec, RunOptions};

enum Reply {
    Stdout(String),
    Exit { code: i32, stderr: String },
}

/// Answers commands by matching their joined argv against registered patterns.
///
/// A pattern matches the whole command line or a prefix ending at an argument
/// boundary. The first registered match wins; unmatched commands succeed with
/// empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, Reply)>,
    calls: RefCell<Vec<(CommandSpec, RunOptions)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: &str, stdout: &str) -> Self {
        self.rules
            .push((pattern.to_string(), Reply::Stdout(stdout.to_string())));
        self
    }

    pub fn fail(mut self, pattern: &str, code: i32, stderr: &str) -> Self {
        self.rules.push((
            pattern.to_string(),
            Reply::Exit {
                code,
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    pub fn calls(&self) -> Vec<(CommandSpec, RunOptions)> {
        self.calls.borrow().clone()
    }

    /// Joined command lines, in call order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|(spec, _)| spec.argv().join(" "))
            .collect()
    }
}

fn matches(line: &str, pattern: &str) -> bool {
    line == pattern || line.starts_with(&format!("{} ", pattern))
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec, options: RunOptions) -> Result<CommandOutput> {
        self.calls.borrow_mut().push((spec.clone(), options));
        let line = spec.argv().join(" ");

        let mut output = CommandOutput {
            args: spec.argv(),
            ..CommandOutput::default()
        };
        match self.rules.iter().find(|(p, _)| matches(&line, p)) {
            Some((_, Reply::Stdout(stdout))) => output.stdout = stdout.clone(),
            Some((_, Reply::Exit { code, stderr })) => {
                output.exit_code = *code;
                output.stderr = stderr.clone();
            }
            None => {}
        }

        if options.check && !output.success() {
            return Err(Error::process_failed(ProcessFailedDetails {
                command: spec.redacted_argv(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            }));
        }
        Ok(output)
    }
}

/// Context rooted at `root` with a fixed identity and default settings.
pub fn context(root: &std::path::Path, env: &str) -> crate::context::DeployContext {
    crate::context::DeployContext {
        root: root.to_path_buf(),
        environment: crate::context::Environment::parse(env).unwrap(),
        identity: crate::identity::Identity {
            subscription_id: "sub-1".to_string(),
            tenant_id: "ten-1".to_string(),
        },
        settings: crate::defaults::Settings::default(),
        overrides: crate::context::Overrides::default(),
    }
}
