use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    PlanningAmbiguousMove,
    PlanInvalid,
    PlanAlreadyApplied,

    ExecutionFailed,
    ExecutionVerificationFailed,
    ExecutionRollbackFailed,

    InternalIoError,
    InternalJsonError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::PlanningAmbiguousMove => "planning.ambiguous_move",
            ErrorCode::PlanInvalid => "plan.invalid",
            ErrorCode::PlanAlreadyApplied => "plan.already_applied",

            ErrorCode::ExecutionFailed => "execution.failed",
            ErrorCode::ExecutionVerificationFailed => "execution.verification_failed",
            ErrorCode::ExecutionRollbackFailed => "execution.rollback_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
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

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

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

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguousMoveDetails {
    pub path: String,
    pub role: String,
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

/// Details attached to `execution.failed` and `execution.verification_failed`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailedDetails {
    pub plan_id: String,
    pub failed_operation: Value,
    pub cause: String,
    pub rolled_back: usize,
}

/// Details attached to `execution.rollback_failed`.
///
/// `unrecovered_operations` lists every inverse operation that could not be
/// applied, in the order rollback attempted them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackFailedDetails {
    pub plan_id: String,
    pub failed_operation: Value,
    pub cause: String,
    pub unrecovered_operations: Vec<Value>,
    pub rollback_errors: Vec<String>,
}

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
        }
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = to_details(ConfigInvalidJsonDetails {
            path: path.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn planning_ambiguous_move(path: impl Into<String>, role: impl Into<String>) -> Self {
        let path = path.into();
        let role = role.into();
        let message = format!("Path '{}' appears more than once as a move {}", path, role);

        Self::new(
            ErrorCode::PlanningAmbiguousMove,
            message,
            to_details(AmbiguousMoveDetails { path, role }),
        )
        .with_hint("Each file may be moved once per batch, and no two moves may share a destination")
    }

    pub fn plan_invalid(plan_id: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::PlanInvalid,
            "Update plan is not executable",
            serde_json::json!({ "planId": plan_id.into(), "problem": problem.into() }),
        )
    }

    pub fn plan_already_applied(plan_id: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::PlanAlreadyApplied,
            "Update plan was already executed",
            serde_json::json!({ "planId": plan_id.into() }),
        )
        .with_hint("Rescan and build a new plan for every batch")
    }

    pub fn execution_failed(details: ExecutionFailedDetails) -> Self {
        let message = format!("Execution failed: {}", details.cause);
        Self::new(ErrorCode::ExecutionFailed, message, to_details(details))
            .with_hint("All applied operations were rolled back; the tree is unchanged")
    }

    pub fn execution_verification_failed(details: ExecutionFailedDetails) -> Self {
        let message = format!("Post-execution verification failed: {}", details.cause);
        Self::new(
            ErrorCode::ExecutionVerificationFailed,
            message,
            to_details(details),
        )
        .with_hint("The batch was rolled back; inspect the listed reference before retrying")
    }

    pub fn execution_rollback_failed(details: RollbackFailedDetails) -> Self {
        let message = format!(
            "Rollback failed: {} operation(s) could not be undone",
            details.unrecovered_operations.len()
        );
        Self::new(
            ErrorCode::ExecutionRollbackFailed,
            message,
            to_details(details),
        )
        .with_hint("Manual intervention required: restore the listed operations by hand")
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
