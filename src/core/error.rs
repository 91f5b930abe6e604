use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    ToolNotFound,
    ProcessFailed,

    IdentityResolutionFailed,

    StackMissingVariableTemplate,
    StackMissingOutput,
    StackUpstreamNotBootstrapped,
    StackPhaseViolation,

    BuildRegistryEndpointRequired,
    BuildMissingIncludePath,
    BuildMissingBuildContext,
    BuildMissingTemplate,

    TokensNameCollision,
    TokensInvalidComponent,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::ToolNotFound => "tool.not_found",
            ErrorCode::ProcessFailed => "process.failed",

            ErrorCode::IdentityResolutionFailed => "identity.resolution_failed",

            ErrorCode::StackMissingVariableTemplate => "stack.missing_variable_template",
            ErrorCode::StackMissingOutput => "stack.missing_output",
            ErrorCode::StackUpstreamNotBootstrapped => "stack.upstream_not_bootstrapped",
            ErrorCode::StackPhaseViolation => "stack.phase_violation",

            ErrorCode::BuildRegistryEndpointRequired => "build.registry_endpoint_required",
            ErrorCode::BuildMissingIncludePath => "build.missing_include_path",
            ErrorCode::BuildMissingBuildContext => "build.missing_build_context",
            ErrorCode::BuildMissingTemplate => "build.missing_template",

            ErrorCode::TokensNameCollision => "tokens.name_collision",
            ErrorCode::TokensInvalidComponent => "tokens.invalid_component",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

/// Captured context of an external command that exited nonzero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFailedDetails {
    pub command: Vec<String>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDetails {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("Invalid argument: {}", problem),
            details,
        )
    }

    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(
            ErrorCode::ToolNotFound,
            format!("Required binary not found in PATH: {}", tool),
            serde_json::json!({ "tool": tool }),
        )
    }

    pub fn process_failed(details: ProcessFailedDetails) -> Self {
        let message = format!(
            "Command '{}' exited with status {}",
            details.command.join(" "),
            details.exit_code
        );
        Self::new(ErrorCode::ProcessFailed, message, to_details(details))
    }

    pub fn identity_resolution_failed(problem: impl Into<String>) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::IdentityResolutionFailed,
            format!("Could not resolve cloud identity: {}", problem),
            serde_json::json!({ "problem": problem }),
        )
        .with_hint("Run 'az login' or export AZURE_SUBSCRIPTION_ID and AZURE_TENANT_ID")
    }

    pub fn missing_variable_template(environment: &str, stack_dir: &str, tried: Vec<String>) -> Self {
        Self::new(
            ErrorCode::StackMissingVariableTemplate,
            format!(
                "Missing variables for env '{}' and no example found in {}",
                environment, stack_dir
            ),
            serde_json::json!({
                "environment": environment,
                "stackDir": stack_dir,
                "tried": tried,
            }),
        )
    }

    pub fn missing_stack_output(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            ErrorCode::StackMissingOutput,
            format!("Missing stack output '{}'", field),
            serde_json::json!({ "field": field }),
        )
    }

    pub fn upstream_not_bootstrapped(environment: &str, state_path: &str) -> Self {
        Self::new(
            ErrorCode::StackUpstreamNotBootstrapped,
            format!("Bootstrap state not found at {}", state_path),
            serde_json::json!({
                "environment": environment,
                "statePath": state_path,
            }),
        )
        .with_hint(format!(
            "Run 'stackops bootstrap {}' for this environment first",
            environment
        ))
    }

    pub fn stack_phase_violation(stack: &str, operation: &str, phase: &str) -> Self {
        Self::new(
            ErrorCode::StackPhaseViolation,
            format!(
                "Cannot run '{}' on stack '{}' while it is {}",
                operation, stack, phase
            ),
            serde_json::json!({
                "stack": stack,
                "operation": operation,
                "phase": phase,
            }),
        )
    }

    pub fn registry_endpoint_required() -> Self {
        Self::new(
            ErrorCode::BuildRegistryEndpointRequired,
            "registry_login_server is required",
            Value::Object(serde_json::Map::new()),
        )
        .with_hint("Set registry_login_server in the variable file, pass --registry-login-server, or export AZ_READER_REGISTRY_LOGIN_SERVER")
    }

    pub fn missing_include_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::BuildMissingIncludePath,
            format!("Build context path missing: {}", path),
            to_details(PathDetails { path }),
        )
        .with_hint("Did you run the app build?")
    }

    pub fn missing_build_context(target: &str, path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::BuildMissingBuildContext,
            format!("Build context not found for {}: {}", target, path),
            to_details(PathDetails { path }),
        )
    }

    pub fn missing_build_template(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::BuildMissingTemplate,
            format!("Build template not found at {}", path),
            to_details(PathDetails { path }),
        )
    }

    pub fn token_name_collision(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::TokensNameCollision,
            format!("Token name already exists: {}", name),
            serde_json::json!({ "name": name }),
        )
        .with_hint("Remove the existing token first, or add it explicitly with --add name:value")
    }

    pub fn invalid_token_component(label: &str, problem: impl Into<String>) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::TokensInvalidComponent,
            format!("Invalid token {}: {}", label, problem),
            serde_json::json!({ "component": label, "problem": problem }),
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            to_details(ConfigMissingKeyDetails {
                key: key.into(),
                path,
            }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            to_details(ConfigInvalidJsonDetails {
                path: path.into(),
                error: err.to_string(),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalJsonErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Typed view of a `process.failed` error's captured output.
    pub fn process_details(&self) -> Option<ProcessFailedDetails> {
        if self.code != ErrorCode::ProcessFailed {
            return None;
        }
        serde_json::from_value(self.details.clone()).ok()
    }
}
