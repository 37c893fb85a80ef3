//! V8 evaluation under capability lockdown and a preemptive deadline
//!
//! V8 isolates are `!Send`, so each evaluation runs to completion on the
//! calling thread. A watchdog thread holds the isolate's thread-safe handle
//! and calls `terminate_execution()` at the deadline — a cooperative timeout
//! cannot interrupt a non-yielding loop, so preemption has to come from
//! outside the isolate's own control flow.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deno_core::{v8, JsRuntime, RuntimeOptions};

use crate::capabilities::CapabilitySet;
use crate::limits::ResourceLimits;
use crate::ops::{console_capture_extension, LogBuffer};

/// Outcome of one sandboxed evaluation.
#[derive(Debug)]
pub(crate) struct Evaluation {
    /// Rendered completion value; `None` when the script evaluated to
    /// `undefined` or failed.
    pub output: Option<String>,
    /// Captured console lines, in call order. Retained even on timeout.
    pub logs: Vec<String>,
    /// Failure text: runtime exception, parse error, timeout, or memory
    /// limit. Mutually exclusive with `output`.
    pub error: Option<String>,
    /// Wall-clock time of the user-script evaluation.
    pub duration: Duration,
}

/// State shared with the near-heap-limit callback.
struct HeapGuard {
    handle: v8::IsolateHandle,
    tripped: AtomicBool,
}

/// Terminates execution when V8 approaches the heap limit, instead of letting
/// the process abort. Grants 1MB of grace so the termination exception can
/// propagate.
extern "C" fn on_near_heap_limit(
    data: *mut c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points at the `HeapGuard` owned by `evaluate`, which
    // stays alive until after the watchdog is joined and no more JS runs.
    // `tripped` is atomic, so a shared reference suffices even if V8 calls
    // this re-entrantly.
    let guard = unsafe { &*(data as *const HeapGuard) };
    if !guard.tripped.swap(true, Ordering::SeqCst) {
        guard.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

/// Evaluate `code` as a single top-level script in a fresh, locked-down
/// isolate. Never panics and never returns early without a terminal outcome;
/// every failure mode lands in `Evaluation::error`.
pub(crate) fn evaluate(
    code: &str,
    capabilities: &CapabilitySet,
    limits: &ResourceLimits,
) -> Evaluation {
    let initial_heap = (limits.max_heap_bytes / 10).min(10 * 1024 * 1024);
    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![console_capture_extension()],
        create_params: Some(
            v8::CreateParams::default().heap_limits(initial_heap, limits.max_heap_bytes),
        ),
        ..Default::default()
    });
    runtime.op_state().borrow_mut().put(LogBuffer::default());

    let heap_guard = Box::new(HeapGuard {
        handle: runtime.v8_isolate().thread_safe_handle(),
        tripped: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        on_near_heap_limit,
        &*heap_guard as *const HeapGuard as *mut c_void,
    );

    // User code must never run in an unlocked environment.
    if let Err(err) = runtime.execute_script("<lockdown>", capabilities.lockdown_script()) {
        return Evaluation {
            output: None,
            logs: Vec::new(),
            error: Some(format!("sandbox initialization failed: {err}")),
            duration: Duration::ZERO,
        };
    }

    let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog_flag = timed_out.clone();
    let budget = limits.max_duration;
    let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();

    let watchdog = std::thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(budget) {
            watchdog_flag.store(true, Ordering::SeqCst);
            watchdog_handle.terminate_execution();
        }
    });

    let start = Instant::now();
    let result = runtime.execute_script("<sandbox>", code.to_string());
    let duration = start.elapsed();

    // Join the watchdog before the runtime is dropped — the IsolateHandle
    // must not outlive the isolate.
    let _ = cancel_tx.send(());
    let _ = watchdog.join();

    let (output, error) = if heap_guard.tripped.load(Ordering::SeqCst) {
        (
            None,
            Some(format!(
                "Memory limit of {} bytes exceeded",
                limits.max_heap_bytes
            )),
        )
    } else if timed_out.load(Ordering::SeqCst) {
        (
            None,
            Some(format!("Execution timed out after {}ms", budget.as_millis())),
        )
    } else {
        match result {
            Ok(global) => {
                let scope = &mut runtime.handle_scope();
                let local = v8::Local::new(scope, global);
                (render_value(scope, local), None)
            }
            Err(err) => (None, Some(err.to_string())),
        }
    };

    let logs = {
        let op_state = runtime.op_state();
        let mut op_state = op_state.borrow_mut();
        op_state
            .try_take::<LogBuffer>()
            .map(|buffer| buffer.0)
            .unwrap_or_default()
    };

    Evaluation {
        output,
        logs,
        error,
        duration,
    }
}

/// Render a completion value for transport: strings literally, structured
/// values as pretty-printed JSON, anything unserializable as V8's lossy
/// string form. Serialization failure degrades, it never errors.
fn render_value<'s>(
    scope: &mut v8::HandleScope<'s>,
    value: v8::Local<'s, v8::Value>,
) -> Option<String> {
    if value.is_undefined() {
        return None;
    }
    if value.is_null() {
        return Some("null".to_string());
    }
    if value.is_string() {
        return Some(value.to_rust_string_lossy(scope));
    }
    match deno_core::serde_v8::from_v8::<serde_json::Value>(scope, value) {
        Ok(json) => Some(
            serde_json::to_string_pretty(&json)
                .unwrap_or_else(|_| value.to_rust_string_lossy(scope)),
        ),
        Err(_) => Some(value.to_rust_string_lossy(scope)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> Evaluation {
        evaluate(
            code,
            &CapabilitySet::default(),
            &ResourceLimits::default(),
        )
    }

    #[test]
    fn expression_value_is_returned() {
        let evaluation = run("const x = 2 + 2; x");
        assert_eq!(evaluation.output.as_deref(), Some("4"));
        assert!(evaluation.error.is_none());
    }

    #[test]
    fn string_values_render_literally() {
        let evaluation = run(r#""hello""#);
        assert_eq!(evaluation.output.as_deref(), Some("hello"));
    }

    #[test]
    fn structured_values_render_as_pretty_json() {
        let evaluation = run(r#"({ a: 1, b: [2, 3] })"#);
        let output = evaluation.output.unwrap();
        assert!(output.contains("\"a\": 1"));
        assert!(output.contains('\n'), "expected pretty-printed output");
    }

    #[test]
    fn undefined_result_yields_no_output_and_no_error() {
        let evaluation = run("let y = 1;");
        assert!(evaluation.output.is_none());
        assert!(evaluation.error.is_none());
    }

    #[test]
    fn null_result_renders_as_null() {
        let evaluation = run("null");
        assert_eq!(evaluation.output.as_deref(), Some("null"));
    }

    #[test]
    fn unserializable_result_degrades_to_string_form() {
        let evaluation = run("(() => 1)");
        assert!(evaluation.error.is_none());
        assert!(evaluation.output.is_some());
    }

    #[test]
    fn console_lines_are_captured_in_order() {
        let evaluation = run(r#"console.log("hello"); console.log("world")"#);
        assert_eq!(evaluation.logs, vec!["hello", "world"]);
    }

    #[test]
    fn warn_and_error_lines_are_tagged() {
        let evaluation = run(r#"console.warn("careful"); console.error("bad", 1)"#);
        assert_eq!(evaluation.logs, vec!["[warn] careful", "[error] bad 1"]);
    }

    #[test]
    fn log_arguments_render_like_return_values() {
        let evaluation = run(r#"console.log("x", { a: 1 }, undefined)"#);
        assert_eq!(evaluation.logs.len(), 1);
        let line = &evaluation.logs[0];
        assert!(line.starts_with("x {"));
        assert!(line.ends_with("} undefined"));
    }

    #[test]
    fn thrown_errors_surface_their_message() {
        let evaluation = run(r#"throw new Error("boom")"#);
        assert!(evaluation.output.is_none());
        assert!(evaluation.error.unwrap().contains("boom"));
    }

    #[test]
    fn syntax_errors_surface_the_parser_message() {
        let evaluation = run("const = ;");
        let error = evaluation.error.unwrap();
        assert!(error.contains("SyntaxError"), "got: {error}");
    }

    #[test]
    fn unlisted_identifiers_fail_at_lookup_time() {
        let evaluation = run(r#"fetch("https://example.com")"#);
        let error = evaluation.error.unwrap();
        assert!(error.contains("fetch is not defined"), "got: {error}");
    }

    #[test]
    fn deno_global_is_unreachable() {
        let evaluation = run("typeof Deno");
        assert_eq!(evaluation.output.as_deref(), Some("undefined"));
    }

    #[test]
    fn eval_is_unreachable() {
        let evaluation = run("typeof eval");
        assert_eq!(evaluation.output.as_deref(), Some("undefined"));
    }

    #[test]
    fn function_constructor_is_blocked_via_prototype_chain() {
        let evaluation = run("String((() => {}).constructor)");
        assert_eq!(evaluation.output.as_deref(), Some("undefined"));
    }

    #[test]
    fn busy_loop_is_preempted_within_the_budget() {
        let limits = ResourceLimits::default().with_max_duration(Duration::from_millis(250));
        let start = Instant::now();
        let evaluation = evaluate("while(true) {}", &CapabilitySet::default(), &limits);
        let elapsed = start.elapsed();

        let error = evaluation.error.unwrap();
        assert!(error.contains("timed out"), "got: {error}");
        assert!(evaluation.output.is_none());
        assert!(
            elapsed < Duration::from_secs(5),
            "termination took {elapsed:?}"
        );
    }

    #[test]
    fn logs_before_the_deadline_survive_a_timeout() {
        let limits = ResourceLimits::default().with_max_duration(Duration::from_millis(250));
        let evaluation = evaluate(
            r#"console.log("before the loop"); while(true) {}"#,
            &CapabilitySet::default(),
            &limits,
        );
        assert!(evaluation.error.unwrap().contains("timed out"));
        assert_eq!(evaluation.logs, vec!["before the loop"]);
    }

    #[test]
    fn runaway_allocation_hits_the_memory_limit() {
        let limits = ResourceLimits::default()
            .with_max_heap_bytes(32 * 1024 * 1024)
            .with_max_duration(Duration::from_secs(30));
        let evaluation = evaluate(
            r#"const hog = []; while(true) { hog.push(new Array(100000).fill("x")); }"#,
            &CapabilitySet::default(),
            &limits,
        );
        let error = evaluation.error.unwrap();
        assert!(error.contains("Memory limit"), "got: {error}");
    }

    #[test]
    fn deterministic_code_is_deterministic() {
        let first = run("[1, 2, 3].map(n => n * 2).join(',')");
        let second = run("[1, 2, 3].map(n => n * 2).join(',')");
        assert_eq!(first.output, second.output);
        assert_eq!(first.output.as_deref(), Some("2,4,6"));
    }
}
