/// Result Normalizer - Backend Response to ExecutionResult
///
/// **Decision Table (first match wins):**
/// 1. Non-empty compile stderr → compile failure
/// 2. Run section present → stdout/stderr/exit code
/// 3. Neither → "Execution failed"
///
/// Pure function: knows nothing about endpoints or timing. The caller
/// stamps `execution_time_ms` from its own wall clock.
use crate::remote::BackendResponse;
use coderun_common::ExecutionResult;

pub const EXECUTION_FAILED: &str = "Execution failed";

pub fn normalize(response: &BackendResponse) -> ExecutionResult {
    if let Some(compile) = &response.compile {
        let stderr = compile.stderr.as_deref().unwrap_or_default();
        if !stderr.is_empty() {
            let stdout = compile.stdout.clone().unwrap_or_default();
            return ExecutionResult::failed(stdout, stderr);
        }
    }

    if let Some(run) = &response.run {
        let output = run
            .stdout
            .as_deref()
            .unwrap_or_default()
            .trim_end()
            .to_string();
        let stderr = run.stderr.clone().unwrap_or_default();

        let error = if !stderr.is_empty() {
            stderr
        } else {
            match (run.code, run.signal.as_deref()) {
                (Some(code), _) if code != 0 => format!("Process exited with code {}", code),
                (None, Some(signal)) if !signal.is_empty() => {
                    format!("Process terminated by signal {}", signal)
                }
                _ => String::new(),
            }
        };

        // Missing exit code without a signal counts as a clean exit
        let exit_code = run.code.unwrap_or(0);
        if exit_code == 0 && error.is_empty() {
            return ExecutionResult::succeeded(output);
        }
        return ExecutionResult::failed(output, error);
    }

    match response.message.as_deref() {
        Some(message) if !message.is_empty() => {
            ExecutionResult::failed("", format!("{}: {}", EXECUTION_FAILED, message))
        }
        _ => ExecutionResult::failed("", EXECUTION_FAILED),
    }
}
