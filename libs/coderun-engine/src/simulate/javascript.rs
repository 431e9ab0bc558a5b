//! JavaScript simulation
//!
//! Scripts run in a fresh V8 isolate through deno_core. The only host object
//! a script can reach is `console`, whose methods append to a captured buffer
//! using Node's value formatting. A watchdog thread terminates the isolate at
//! the wall-clock deadline, and a near-heap-limit callback does the same when
//! the heap fills up. Termination cannot be caught by the script.

use super::SimulationOutput;
use deno_core::{op2, v8, Extension, JsRuntime, OpState, PollEventLoopOptions, RuntimeOptions};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Wall-clock budget for one script, microtasks included
pub const TIME_LIMIT: Duration = Duration::from_millis(2_000);
pub const HEAP_LIMIT_BYTES: usize = 128 * 1024 * 1024;
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// What the script wrote, kept in the isolate's `OpState` while it runs
#[derive(Debug, Default)]
struct Capture {
    output: String,
    truncated: bool,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct Interrupts {
    timed_out: AtomicBool,
    heap_exhausted: AtomicBool,
}

#[op2(fast)]
fn op_console_write(state: &mut OpState, #[string] line: &str) {
    let capture = state.borrow_mut::<Capture>();
    if capture.truncated {
        return;
    }
    if capture.output.len() + line.len() + 1 > MAX_OUTPUT_BYTES {
        capture.truncated = true;
        return;
    }
    capture.output.push_str(line);
    capture.output.push('\n');
}

#[op2(fast)]
fn op_report_error(state: &mut OpState, #[string] message: &str) {
    let capture = state.borrow_mut::<Capture>();
    capture.error.get_or_insert_with(|| message.to_string());
}

fn console_extension() -> Extension {
    Extension {
        name: "coderun_console",
        ops: Cow::Owned(vec![op_console_write(), op_report_error()]),
        ..Default::default()
    }
}

/// Installs `console`, hides `Deno`, then evaluates the source globally
const PRELUDE: &str = r##"(function (source) {
  "use strict";
  const { op_console_write: write, op_report_error: report } = globalThis.Deno.core.ops;
  try { delete globalThis.Deno; } catch (_) {}

  const identifier = /^[A-Za-z_$][\w$]*$/;

  function quote(s) {
    const body = JSON.stringify(s).slice(1, -1).replace(/\\"/g, '"');
    if (!s.includes("'")) return "'" + body + "'";
    if (!s.includes('"')) return '"' + body + '"';
    return "'" + body.replace(/'/g, "\\'") + "'";
  }

  function wrap(prefix, open, close, parts, indent) {
    const start = prefix + open;
    if (parts.length === 0) return start + close;
    const width = parts.reduce((n, p) => n + p.length + 2, 0) + start.length + indent + 10;
    if (width <= 80 && !parts.some((p) => p.includes("\n"))) {
      return start + " " + parts.join(", ") + " " + close;
    }
    const pad = " ".repeat(indent + 2);
    return start + "\n" + pad + parts.join(",\n" + pad) + "\n" + " ".repeat(indent) + close;
  }

  function formatFunction(fn) {
    if (Function.prototype.toString.call(fn).startsWith("class")) {
      return fn.name ? "[class " + fn.name + "]" : "[class (anonymous)]";
    }
    const kind = (fn.constructor && fn.constructor.name) || "Function";
    return fn.name ? "[" + kind + ": " + fn.name + "]" : "[" + kind + " (anonymous)]";
  }

  function prefixOf(obj) {
    const proto = Object.getPrototypeOf(obj);
    if (proto === null) return "[Object: null prototype] ";
    const name = typeof proto.constructor === "function" ? proto.constructor.name : "";
    return name && name !== "Object" ? name + " " : "";
  }

  function property(obj, key, child) {
    const desc = Object.getOwnPropertyDescriptor(obj, key);
    const label = identifier.test(key) ? key : quote(key);
    if (desc && desc.get) return label + ": " + (desc.set ? "[Getter/Setter]" : "[Getter]");
    if (desc && desc.set) return label + ": [Setter]";
    return label + ": " + child(obj[key]);
  }

  function formatValue(value, depth, indent, seen, refs, top) {
    switch (typeof value) {
      case "string": return top ? value : quote(value);
      case "number": return Object.is(value, -0) ? "-0" : String(value);
      case "bigint": return value + "n";
      case "symbol": return value.toString();
      case "function": return formatFunction(value);
      case "undefined": return "undefined";
      case "boolean": return String(value);
    }
    if (value === null) return "null";

    if (seen.includes(value)) {
      if (!refs.has(value)) refs.set(value, refs.size + 1);
      return "[Circular *" + refs.get(value) + "]";
    }

    let text;
    if (value instanceof Error) {
      const summary = Error.prototype.toString.call(value);
      text = top ? summary : "[" + summary + "]";
    } else if (value instanceof Date) {
      text = isNaN(value.getTime()) ? "Invalid Date" : value.toISOString();
    } else if (value instanceof RegExp) {
      text = String(value);
    } else {
      if (depth > 2) {
        return Array.isArray(value) ? "[Array]" : "[" + (prefixOf(value).trim() || "Object") + "]";
      }
      seen.push(value);
      const child = (v) => formatValue(v, depth + 1, indent + 2, seen, refs, false);
      if (Array.isArray(value)) {
        const parts = [];
        const shown = Math.min(value.length, 100);
        for (let i = 0; i < shown; i++) {
          parts.push(i in value ? child(value[i]) : "<1 empty item>");
        }
        if (value.length > shown) parts.push("... " + (value.length - shown) + " more items");
        text = wrap("", "[", "]", parts, indent);
      } else if (value instanceof Map) {
        const parts = [...value].map(([k, v]) => child(k) + " => " + child(v));
        text = wrap("Map(" + value.size + ") ", "{", "}", parts, indent);
      } else if (value instanceof Set) {
        const parts = [...value].map(child);
        text = wrap("Set(" + value.size + ") ", "{", "}", parts, indent);
      } else {
        const parts = Object.keys(value).map((key) => property(value, key, child));
        text = wrap(prefixOf(value), "{", "}", parts, indent);
      }
      seen.pop();
    }
    if (refs.has(value)) text = "<ref *" + refs.get(value) + "> " + text;
    return text;
  }

  const inspect = (value, top) => formatValue(value, 0, 0, [], new Map(), top);

  function substitute(spec, arg) {
    switch (spec) {
      case "s":
        return typeof arg === "object" && arg !== null ? inspect(arg, false) : String(arg);
      case "d":
      case "i":
        if (typeof arg === "bigint") return arg + "n";
        if (typeof arg === "symbol") return "NaN";
        return inspect(spec === "i" ? parseInt(arg) : Number(arg), false);
      case "f":
        return typeof arg === "symbol" ? "NaN" : inspect(parseFloat(arg), false);
      case "j":
        try { return JSON.stringify(arg); } catch (_) { return "[Circular]"; }
      default:
        return inspect(arg, false);
    }
  }

  function format(args) {
    let rest = args;
    const parts = [];
    if (typeof args[0] === "string" && args.length > 1 && args[0].includes("%")) {
      let next = 1;
      parts.push(args[0].replace(/%([sdifjoO%])/g, (match, spec) => {
        if (spec === "%") return "%";
        if (next >= args.length) return match;
        return substitute(spec, args[next++]);
      }));
      rest = args.slice(next);
    }
    for (const arg of rest) parts.push(inspect(arg, true));
    return parts.join(" ");
  }

  const log = (...args) => write(format(args));
  const console = {
    log,
    info: log,
    debug: log,
    warn: log,
    error: log,
    trace: log,
    dir: (value) => write(inspect(value, false)),
    assert: (condition, ...args) => {
      if (!condition) write(format(args.length ? ["Assertion failed:", ...args] : ["Assertion failed"]));
    },
  };
  Object.defineProperty(globalThis, "console", {
    value: console,
    writable: true,
    configurable: true,
    enumerable: false,
  });

  try {
    (0, eval)(source);
  } catch (error) {
    report(error instanceof Error ? Error.prototype.toString.call(error) : "Uncaught " + inspect(error, true));
  }
})"##;

pub fn run(code: &str) -> SimulationOutput {
    run_with_limit(code, TIME_LIMIT)
}

/// Run `code` in a new isolate, terminating it once `limit` has elapsed
pub fn run_with_limit(code: &str, limit: Duration) -> SimulationOutput {
    let source = match serde_json::to_string(code) {
        Ok(source) => source,
        Err(e) => return SimulationOutput::failed("", format!("Simulation failed: {}", e)),
    };
    let event_loop = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => return SimulationOutput::failed("", format!("Simulation failed: {}", e)),
    };
    let _guard = event_loop.enter();

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![console_extension()],
        create_params: Some(v8::CreateParams::default().heap_limits(0, HEAP_LIMIT_BYTES)),
        ..Default::default()
    });
    runtime.op_state().borrow_mut().put(Capture::default());

    let interrupts = Arc::new(Interrupts::default());
    let isolate = runtime.v8_isolate().thread_safe_handle();

    let on_heap_limit = Arc::clone(&interrupts);
    let heap_isolate = isolate.clone();
    runtime.add_near_heap_limit_callback(move |current, _initial| {
        on_heap_limit.heap_exhausted.store(true, Ordering::SeqCst);
        heap_isolate.terminate_execution();
        // Headroom so V8 can unwind instead of aborting the process
        current * 2
    });

    let (finished, deadline) = mpsc::channel::<()>();
    let on_deadline = Arc::clone(&interrupts);
    let watchdog = thread::Builder::new()
        .name("simulate-watchdog".to_string())
        .spawn(move || {
            if let Err(mpsc::RecvTimeoutError::Timeout) = deadline.recv_timeout(limit) {
                on_deadline.timed_out.store(true, Ordering::SeqCst);
                isolate.terminate_execution();
            }
        });
    let watchdog = match watchdog {
        Ok(handle) => handle,
        Err(e) => return SimulationOutput::failed("", format!("Simulation failed: {}", e)),
    };

    let outcome = match runtime.execute_script("<simulation>", format!("{}({});", PRELUDE, source)) {
        Ok(_) => event_loop
            .block_on(runtime.run_event_loop(PollEventLoopOptions::default()))
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    drop(finished);
    if watchdog.join().is_err() {
        tracing::warn!("Simulation watchdog panicked");
    }

    let capture = runtime.op_state().borrow_mut().try_take::<Capture>().unwrap_or_default();
    if capture.truncated {
        tracing::debug!(limit = MAX_OUTPUT_BYTES, "Script output truncated");
    }
    let output = capture.output.trim_end().to_string();

    let error = if interrupts.timed_out.load(Ordering::SeqCst) {
        Some(format!(
            "Error: Execution timed out after {} ms (possible infinite loop)",
            limit.as_millis()
        ))
    } else if interrupts.heap_exhausted.load(Ordering::SeqCst) {
        Some("RangeError: Simulation memory limit exceeded".to_string())
    } else if let Some(error) = capture.error {
        Some(error)
    } else {
        outcome.err().map(|e| describe_engine_error(&e))
    };

    match error {
        None => SimulationOutput::ok(output),
        Some(error) => {
            tracing::debug!(error = %error, "Script failed");
            SimulationOutput::failed(output, error)
        }
    }
}

/// First line of an engine error, without the rejection marker
fn describe_engine_error(message: &str) -> String {
    let first = message.lines().next().unwrap_or(message).trim();
    first.strip_prefix("Uncaught (in promise) ").unwrap_or(first).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: &str) -> String {
        let result = run(code);
        assert_eq!(result.error, None, "unexpected error for {:?}", code);
        result.output
    }

    #[test]
    fn test_console_log_arithmetic() {
        assert_eq!(output("console.log(1+2)"), "3");
    }

    #[test]
    fn test_console_formats_like_node() {
        let code = r#"
console.log("a", 1, true, null, undefined);
console.log([1, "two", [3]]);
console.log({ name: "x", nested: { ok: true } });
console.log(0.1 + 0.2, 10 / 4, -0, 1 / 0);
console.log({ a: { b: { c: { d: 1 } } } });
console.log(function foo() {}, () => 1, class A {});
console.log("%s is %d years", "Ada", 36);
console.warn("warned");
console.error("errored");
"#;
        assert_eq!(
            output(code),
            "a 1 true null undefined\n[ 1, 'two', [ 3 ] ]\n{ name: 'x', nested: { ok: true } }\n0.30000000000000004 2.5 -0 Infinity\n{ a: { b: { c: [Object] } } }\n[Function: foo] [Function (anonymous)] [class A]\nAda is 36 years\nwarned\nerrored"
        );
    }

    #[test]
    fn test_functions_closures_and_recursion() {
        let code = r#"
function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }
const makeCounter = () => { let count = 0; return () => ++count; };
const counter = makeCounter();
counter(); counter();
console.log(fib(15), counter());
"#;
        assert_eq!(output(code), "610 3");
    }

    #[test]
    fn test_classes_and_inheritance() {
        let code = r#"
class Animal {
  constructor(name) { this.name = name; }
  speak() { return `${this.name} makes a sound`; }
}
class Dog extends Animal {
  speak() { return `${this.name} barks`; }
}
const d = new Dog("Rex");
console.log(d.speak(), d instanceof Animal);
console.log(d);
"#;
        assert_eq!(output(code), "Rex barks true\nDog { name: 'Rex' }");
    }

    #[test]
    fn test_switch_and_destructuring() {
        let code = r#"
function kind(n) {
  switch (n % 3) {
    case 0: return "fizz";
    case 1: return "one";
    default: return "other";
  }
}
const { a, b: [x, y = 5] } = { a: 1, b: [2] };
const [first, ...rest] = [1, 2, 3];
console.log(kind(3), kind(4), kind(5));
console.log(a, x, y, first, rest);
"#;
        assert_eq!(output(code), "fizz one other\n1 2 5 1 [ 2, 3 ]");
    }

    #[test]
    fn test_builtin_collections_and_dates() {
        let code = r#"
const m = new Map([["a", 1]]);
m.set("b", 2);
const s = new Set([1, 2, 2, 3]);
console.log(m.get("b"), m.size, s.size, [...s]);
console.log(m, s);
const d = new Date(Date.UTC(2024, 0, 15));
console.log(d.getUTCFullYear(), d.toISOString());
"#;
        assert_eq!(
            output(code),
            "2 2 3 [ 1, 2, 3 ]\nMap(2) { 'a' => 1, 'b' => 2 } Set(3) { 1, 2, 3 }\n2024 2024-01-15T00:00:00.000Z"
        );
    }

    #[test]
    fn test_async_functions_run_to_completion() {
        let code = r#"
const wait = (v) => new Promise((resolve) => resolve(v));
async function main() {
  const a = await wait(1);
  const b = await wait(2);
  console.log("sum", a + b);
}
main().then(() => console.log("done"));
console.log("sync first");
"#;
        assert_eq!(output(code), "sync first\nsum 3\ndone");
    }

    #[test]
    fn test_unhandled_rejection_is_reported() {
        let result = run("async function f() { throw new Error('late'); }\nconsole.log('a');\nf();");
        assert_eq!(result.output, "a");
        assert_eq!(result.error.as_deref(), Some("Error: late"));
    }

    #[test]
    fn test_regex_literals() {
        let code = r#"
console.log("Order 66 and 42".match(/\d+/g), /^h.llo$/i.test("HELLO"));
console.log("a-b_c".replace(/[-_]/g, " "));
"#;
        assert_eq!(output(code), "[ '66', '42' ] true\na b c");
    }

    #[test]
    fn test_string_length_counts_utf16_units() {
        assert_eq!(output(r"console.log('\u00e9\u{1F600}'.length, [...'\u00e9\u{1F600}'].length)"), "3 2");
    }

    #[test]
    fn test_long_loops_finish_within_the_deadline() {
        let code = "let total = 0;\nfor (let i = 0; i < 50000; i++) { total += i; }\nconsole.log(total);";
        assert_eq!(output(code), "1249975000");
    }

    #[test]
    fn test_try_catch_finally() {
        let code = r#"
try {
  null.foo;
} catch (e) {
  console.log(e instanceof TypeError, e.message);
} finally {
  console.log("cleanup");
}
try { throw new RangeError("too big"); } catch (err) { console.log(String(err)); }
try { "x".repeat(2 ** 30); } catch (e) { console.log(e.name, e.message); }
"#;
        assert_eq!(
            output(code),
            "true Cannot read properties of null (reading 'foo')\ncleanup\nRangeError: too big\nRangeError Invalid string length"
        );
    }

    #[test]
    fn test_uncaught_error_reports_name_and_message() {
        let result = run("console.log('before');\nthrow new Error('bad');\nconsole.log('after');");
        assert_eq!(result.output, "before");
        assert_eq!(result.error.as_deref(), Some("Error: bad"));
    }

    #[test]
    fn test_uncaught_non_error_value() {
        assert_eq!(run("throw 'oops'").error.as_deref(), Some("Uncaught oops"));
        assert_eq!(run("throw { code: 7 }").error.as_deref(), Some("Uncaught { code: 7 }"));
    }

    #[test]
    fn test_engine_error_messages() {
        assert_eq!(
            run("console.log(missing)").error.as_deref(),
            Some("ReferenceError: missing is not defined")
        );
        assert_eq!(
            run("const o = {}; o.run()").error.as_deref(),
            Some("TypeError: o.run is not a function")
        );
        assert_eq!(
            run("const a = 1; a = 2;").error.as_deref(),
            Some("TypeError: Assignment to constant variable.")
        );
    }

    #[test]
    fn test_syntax_error() {
        let result = run("console.log('never');\nlet x = ;");
        assert!(result.output.is_empty());
        assert_eq!(result.error.as_deref(), Some("SyntaxError: Unexpected token ';'"));
    }

    #[test]
    fn test_unbounded_recursion_is_a_range_error() {
        let result = run("function f(n) { return f(n + 1); }\nf(0);");
        assert_eq!(result.error.as_deref(), Some("RangeError: Maximum call stack size exceeded"));
    }

    #[test]
    fn test_infinite_loop_is_terminated_uncatchably() {
        let code = "console.log('start');\ntry { while (true) {} } catch (e) { console.log('caught'); }";
        let result = run_with_limit(code, Duration::from_millis(200));

        assert_eq!(result.output, "start");
        assert_eq!(
            result.error.as_deref(),
            Some("Error: Execution timed out after 200 ms (possible infinite loop)")
        );
    }

    #[test]
    fn test_endless_microtasks_are_terminated() {
        let code = "function spin() { Promise.resolve().then(spin); }\nspin();";
        let result = run_with_limit(code, Duration::from_millis(200));
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[test]
    fn test_heap_exhaustion_is_reported() {
        let code = "const hoard = [];\nwhile (true) { hoard.push(new Array(1000000).fill(1)); }";
        let result = run(code);
        assert_eq!(result.error.as_deref(), Some("RangeError: Simulation memory limit exceeded"));
    }

    #[test]
    fn test_output_is_capped() {
        let result = run("for (let i = 0; i < 200000; i++) console.log('line ' + i);");
        assert_eq!(result.error, None);
        assert!(result.output.starts_with("line 0\nline 1\n"));
        assert!(result.output.len() <= MAX_OUTPUT_BYTES);
    }

    #[test]
    fn test_only_console_is_exposed() {
        assert_eq!(
            output("console.log(typeof Deno, typeof require, typeof process, typeof fetch)"),
            "undefined undefined undefined undefined"
        );
    }

    #[test]
    fn test_output_is_trimmed() {
        assert_eq!(output("console.log('x\\n\\n')"), "x");
    }

    #[test]
    fn test_cyclic_structures_are_marked() {
        let code = r#"
const a = [];
a.push(a);
const o = {};
o.self = o;
console.log(a, o);
"#;
        assert_eq!(output(code), "<ref *1> [ [Circular *1] ] <ref *1> { self: [Circular *1] }");
    }
}
