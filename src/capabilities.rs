//! Capability allowlist for the sandboxed global environment
//!
//! The sandbox exposes an explicit, enumerated binding table; anything not
//! listed is unreachable, not merely unused. The lockdown script walks the
//! global object and deletes every binding outside the table, so an unlisted
//! identifier fails with a `ReferenceError` at lookup time.

/// Pure, side-effect-free global bindings visible inside the sandbox.
///
/// Explicitly absent: timers, `fetch`, `Deno`, `process`, `require`, `eval`,
/// `Function` — no network, filesystem, process, timer, or code-generation
/// access.
const DEFAULT_BINDINGS: &[&str] = &[
    // ambient values
    "globalThis",
    "undefined",
    "NaN",
    "Infinity",
    // captured console (installed by the lockdown script)
    "console",
    // structured data and math
    "JSON",
    "Math",
    "Date",
    // primitives and collections
    "Array",
    "Object",
    "String",
    "Number",
    "Boolean",
    "BigInt",
    "Symbol",
    "RegExp",
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    "Promise",
    // error constructors
    "Error",
    "AggregateError",
    "EvalError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
    "TypeError",
    "URIError",
    // numeric parsing
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    // safe URI encode/decode
    "encodeURIComponent",
    "decodeURIComponent",
    "encodeURI",
    "decodeURI",
];

/// Bootstrap run before any user code. Installs the capturing `console`,
/// strips the global object down to the allowlist, then neuters the
/// code-generation constructors reachable through prototype chains.
///
/// Ops are captured in the closure parameter before `Deno` is deleted by the
/// allowlist walk; the function prototypes are captured before the global
/// `Function` binding disappears.
const LOCKDOWN_TEMPLATE: &str = r#"
((ops) => {
    const render = (value) => {
        if (value === undefined) return 'undefined';
        if (value === null) return 'null';
        if (typeof value === 'string') return value;
        try {
            const text = JSON.stringify(value, null, 2);
            return text === undefined ? String(value) : text;
        } catch (_) {
            return String(value);
        }
    };
    const capture = (line) => ops.op_capture_log(line);
    const joined = (args) => args.map(render).join(' ');
    Object.defineProperty(globalThis, 'console', {
        value: Object.freeze({
            log: (...args) => capture(joined(args)),
            warn: (...args) => capture('[warn] ' + joined(args)),
            error: (...args) => capture('[error] ' + joined(args)),
        }),
        writable: false,
        configurable: false,
    });

    const protos = [
        Function.prototype,
        (async function () {}).constructor.prototype,
        (function* () {}).constructor.prototype,
    ];

    const allowed = new Set(__ALLOWED_BINDINGS__);
    for (const key of Reflect.ownKeys(globalThis)) {
        if (typeof key !== 'string' || allowed.has(key)) continue;
        try { delete globalThis[key]; } catch (_) {}
    }

    for (const proto of protos) {
        Object.defineProperty(proto, 'constructor', {
            value: undefined,
            writable: false,
            configurable: false,
        });
    }
})(Deno.core.ops);
"#;

/// The fixed allowlist of global bindings visible inside the sandbox.
///
/// Process-wide configuration, shared read-only by all invocations; never
/// mutated per request.
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    bindings: &'static [&'static str],
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self {
            bindings: DEFAULT_BINDINGS,
        }
    }
}

impl CapabilitySet {
    /// The enumerated binding names.
    pub fn bindings(&self) -> &[&str] {
        self.bindings
    }

    /// Whether a global binding survives the lockdown.
    pub fn allows(&self, name: &str) -> bool {
        self.bindings.contains(&name)
    }

    /// Render the lockdown script for this allowlist.
    pub(crate) fn lockdown_script(&self) -> String {
        let allowed = serde_json::Value::from(self.bindings.to_vec()).to_string();
        LOCKDOWN_TEMPLATE.replace("__ALLOWED_BINDINGS__", &allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangerous_bindings_are_not_listed() {
        let caps = CapabilitySet::default();
        for name in [
            "eval",
            "Function",
            "Deno",
            "fetch",
            "setTimeout",
            "setInterval",
            "require",
            "process",
        ] {
            assert!(!caps.allows(name), "{name} must not be allowlisted");
        }
    }

    #[test]
    fn pure_primitives_are_listed() {
        let caps = CapabilitySet::default();
        for name in ["console", "JSON", "Math", "Date", "Map", "Set", "RegExp"] {
            assert!(caps.allows(name), "{name} must be allowlisted");
        }
    }

    #[test]
    fn lockdown_script_embeds_the_allowlist() {
        let script = CapabilitySet::default().lockdown_script();
        assert!(script.contains("op_capture_log"));
        assert!(script.contains("\"Math\""));
        assert!(!script.contains("__ALLOWED_BINDINGS__"));
    }
}
