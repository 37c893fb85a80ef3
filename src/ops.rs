//! Console capture op
//!
//! The lockdown script's `console` renders each call into one formatted line
//! and pushes it through `op_capture_log` into a per-invocation buffer held
//! in the runtime's `OpState`.

use deno_core::{op2, Extension, OpState};

/// Captured console lines, in exact call order. One buffer per invocation,
/// never shared across requests.
#[derive(Debug, Default)]
pub(crate) struct LogBuffer(pub(crate) Vec<String>);

#[op2(fast)]
fn op_capture_log(state: &mut OpState, #[string] line: String) {
    state.borrow_mut::<LogBuffer>().0.push(line);
}

/// Extension exposing the capture op to the lockdown script.
pub(crate) fn console_capture_extension() -> Extension {
    Extension {
        name: "jsbox_console",
        ops: std::borrow::Cow::Owned(vec![op_capture_log()]),
        ..Default::default()
    }
}
