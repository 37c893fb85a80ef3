//! Execution engine: language dispatch and the two-state result stream

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::capabilities::CapabilitySet;
use crate::limits::ResourceLimits;
use crate::sandbox;
use crate::types::{ExecutionRequest, ExecutionState, ExecutionStream, Language};

/// Unique execution identifier, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(
    /// The raw UUID.
    pub uuid::Uuid,
);

impl ExecutionId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sandboxed code-execution engine.
///
/// Stateless across invocations: every [`execute`](Self::execute) call gets a
/// fresh isolate, log buffer, and result stream, all destroyed once the
/// terminal state is delivered or forced termination completes. The
/// capability set and limits are immutable, shared configuration.
pub struct SandboxEngine {
    limits: ResourceLimits,
    capabilities: CapabilitySet,
}

impl SandboxEngine {
    /// Engine with the default 5000ms budget and default capability set.
    pub fn new() -> Self {
        Self {
            limits: ResourceLimits::default(),
            capabilities: CapabilitySet::default(),
        }
    }

    /// Engine with custom resource limits.
    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self {
            limits,
            capabilities: CapabilitySet::default(),
        }
    }

    /// Replace the capability set.
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The configured limits.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Execute a request, returning its two-state result stream.
    ///
    /// Infallible: every failure past validation — syntax error, runtime
    /// exception, timeout, memory limit — is delivered inside the terminal
    /// `Complete` record. Dropping the stream does not cancel the evaluation
    /// or the watchdog deadline.
    pub fn execute(&self, request: ExecutionRequest) -> ExecutionStream {
        let id = ExecutionId::new();
        tracing::info!(
            execution_id = %id,
            language = %request.language,
            code_len = request.code.len(),
            "executing code"
        );

        let (tx, rx) = mpsc::channel(2);

        // Running goes out before any execution side effects are possible.
        let _ = tx.try_send(ExecutionState::Running {
            code: request.code.clone(),
            language: request.language,
        });

        match request.language {
            Language::Html => {
                // No server-side execution: the payload is rendered by a
                // downstream surface, embedded script markup included.
                let _ = tx.try_send(ExecutionState::Complete {
                    code: request.code.clone(),
                    language: Language::Html,
                    output: Some(request.code),
                    logs: String::new(),
                    error: None,
                    execution_time: 0,
                });
            }
            Language::Javascript => {
                let limits = self.limits.clone();
                let capabilities = self.capabilities.clone();
                // Dedicated thread: the isolate is !Send, and termination is
                // driven by the budget rather than by caller presence.
                std::thread::spawn(move || {
                    let evaluation = sandbox::evaluate(&request.code, &capabilities, &limits);
                    tracing::debug!(
                        execution_id = %id,
                        duration_ms = evaluation.duration.as_millis() as u64,
                        failed = evaluation.error.is_some(),
                        "evaluation finished"
                    );
                    let _ = tx.blocking_send(ExecutionState::Complete {
                        code: request.code,
                        language: Language::Javascript,
                        output: evaluation.output,
                        logs: evaluation.logs.join("\n"),
                        error: evaluation.error,
                        execution_time: evaluation.duration.as_millis() as u64,
                    });
                });
            }
        }

        ExecutionStream::new(rx)
    }
}

impl Default for SandboxEngine {
    fn default() -> Self {
        Self::new()
    }
}
