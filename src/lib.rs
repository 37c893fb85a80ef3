#![warn(missing_docs)]

//! # jsbox
//!
//! Sandboxed code-execution engine: accepts a short untrusted program plus a
//! declared language, runs it under resource and capability restrictions, and
//! always delivers a terminal result within a bounded time budget.
//!
//! Two languages are accepted. `javascript` is evaluated in a fresh deno_core
//! (V8) isolate whose global environment is stripped down to an enumerated
//! allowlist of pure primitives. `html` is a passthrough: the payload is
//! rendered by a downstream surface, never evaluated here.
//!
//! ## Security model
//!
//! - **V8 isolate**: same process-level isolation as browser tabs
//! - **Capability allowlist**: anything not enumerated is unreachable, not
//!   merely unused — unlisted identifiers fail at lookup time
//! - **Fresh runtime per call**: no state leakage between invocations
//! - **Preemptive timeout**: a watchdog thread terminates the isolate at the
//!   deadline, so a non-yielding `while(true){}` cannot outlive the budget
//! - **Heap limits**: a near-heap-limit callback stops runaway allocation
//!   before V8 aborts the process
//!
//! ## Result protocol
//!
//! Every invocation emits exactly two [`ExecutionState`] records on its
//! [`ExecutionStream`]: one `Running`, then one terminal `Complete` carrying
//! output, captured logs, error, and elapsed time. Failures after validation
//! are data in the `Complete` record — the engine never throws past its
//! boundary.
//!
//! ```no_run
//! # async fn demo() {
//! use jsbox::{ExecutionRequest, SandboxEngine};
//!
//! let engine = SandboxEngine::new();
//! let stream = engine.execute(ExecutionRequest::new("const x = 2 + 2; x"));
//! let terminal = stream.final_state().await;
//! # let _ = terminal;
//! # }
//! ```

mod capabilities;
mod engine;
mod error;
mod limits;
mod ops;
mod sandbox;
mod types;

pub use capabilities::CapabilitySet;
pub use engine::{ExecutionId, SandboxEngine};
pub use error::ValidationError;
pub use limits::ResourceLimits;
pub use types::{ExecutionRequest, ExecutionState, ExecutionStream, Language};
