//! Core types for sandbox execution

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ValidationError;

/// Declared language of an execution request.
///
/// A closed set: `javascript` is evaluated in the sandbox, `html` passes
/// through unexecuted. Unknown tags are rejected at validation rather than
/// silently defaulted; only a *missing* tag defaults to `javascript`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Evaluated server-side in the capability sandbox.
    #[default]
    Javascript,
    /// Passed through unchanged for downstream rendering.
    Html,
}

impl Language {
    /// The wire tag for this language.
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Html => "html",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" => Ok(Language::Javascript),
            "html" => Ok(Language::Html),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to execute code.
///
/// `code` is an opaque string — it is never parsed or sanitized before
/// execution. The sandbox environment, not source inspection, is the safety
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The code to execute (or pass through, for `html`).
    pub code: String,

    /// Declared language; defaults to `javascript` when omitted.
    #[serde(default)]
    pub language: Language,
}

impl ExecutionRequest {
    /// Create a JavaScript execution request.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: Language::Javascript,
        }
    }

    /// Set the language.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Validate raw input into a well-typed request.
    ///
    /// Shape rules only: the input must be an object, `code` must be a
    /// string, and `language` — when present — must be an accepted tag.
    /// There is no code-size or content validation.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        let map = match value {
            serde_json::Value::Object(map) => map,
            _ => return Err(ValidationError::NotAnObject),
        };

        let code = match map.get("code") {
            Some(serde_json::Value::String(code)) => code.clone(),
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "code",
                    expected: "string",
                })
            }
            None => return Err(ValidationError::MissingField("code")),
        };

        let language = match map.get("language") {
            None | Some(serde_json::Value::Null) => Language::default(),
            Some(serde_json::Value::String(tag)) => tag
                .parse()
                .map_err(|_| ValidationError::UnknownLanguage(tag.clone()))?,
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "language",
                    expected: "string",
                })
            }
        };

        Ok(Self { code, language })
    }
}

/// One record in an invocation's result sequence.
///
/// A two-state machine with a single directed transition: every invocation
/// emits exactly one `Running` followed by exactly one terminal `Complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ExecutionState {
    /// Emitted immediately, before any execution side effects are possible.
    Running {
        /// Echo of the requested code.
        code: String,
        /// Echo of the requested language.
        language: Language,
    },

    /// Emitted once, terminally.
    #[serde(rename_all = "camelCase")]
    Complete {
        /// Echo of the requested code.
        code: String,
        /// Echo of the requested language.
        language: Language,
        /// Rendered completion value. Present only on a successful,
        /// defined-return evaluation; mutually exclusive with `error`.
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        /// Newline-joined captured console lines, in call order. Empty
        /// string, not absent, when nothing was logged.
        logs: String,
        /// Failure text (runtime exception, parse error, timeout, memory
        /// limit). Present only on failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Wall-clock evaluation time in milliseconds. Zero for the `html`
        /// passthrough.
        execution_time: u64,
    },
}

impl ExecutionState {
    /// Whether this is the initial `Running` record.
    pub fn is_running(&self) -> bool {
        matches!(self, ExecutionState::Running { .. })
    }

    /// Whether this is the terminal `Complete` record.
    pub fn is_complete(&self) -> bool {
        matches!(self, ExecutionState::Complete { .. })
    }

    /// The rendered output, if this is a successful terminal record.
    pub fn output(&self) -> Option<&str> {
        match self {
            ExecutionState::Complete { output, .. } => output.as_deref(),
            ExecutionState::Running { .. } => None,
        }
    }

    /// The failure text, if this is a failed terminal record.
    pub fn error(&self) -> Option<&str> {
        match self {
            ExecutionState::Complete { error, .. } => error.as_deref(),
            ExecutionState::Running { .. } => None,
        }
    }

    /// The captured logs, if this is a terminal record.
    pub fn logs(&self) -> Option<&str> {
        match self {
            ExecutionState::Complete { logs, .. } => Some(logs),
            ExecutionState::Running { .. } => None,
        }
    }
}

/// Streaming execution states for one invocation.
///
/// A finite sequence of exactly two elements. Dropping the stream does not
/// cancel the underlying evaluation — forced termination is driven by the
/// timeout budget, not by caller presence.
pub struct ExecutionStream {
    states: mpsc::Receiver<ExecutionState>,
}

impl ExecutionStream {
    pub(crate) fn new(states: mpsc::Receiver<ExecutionState>) -> Self {
        Self { states }
    }

    /// Receive the next state, or `None` once the sequence is exhausted.
    pub async fn recv(&mut self) -> Option<ExecutionState> {
        self.states.recv().await
    }

    /// Drain the stream and return the terminal state.
    pub async fn final_state(mut self) -> Option<ExecutionState> {
        let mut last = None;
        while let Some(state) = self.states.recv().await {
            last = Some(state);
        }
        last
    }

    /// Drain the stream into the full emitted sequence.
    pub async fn collect(mut self) -> Vec<ExecutionState> {
        let mut states = Vec::new();
        while let Some(state) = self.states.recv().await {
            states.push(state);
        }
        states
    }
}
