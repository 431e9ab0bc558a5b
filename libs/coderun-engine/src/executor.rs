/// Execution Facade
///
/// Single entry point for the API and CLI. Every request walks the same
/// state machine and always reaches a terminal state:
///
/// ```text
/// received → validated → preview short-circuit
///                      → remote attempt → remote success
///                                       → exhausted → fallback (once)
/// ```
///
/// ## Request Rules
/// - Blank code or language is rejected before any lookup
/// - Unknown languages are rejected before any network activity
/// - Preview languages (html/css) echo the code back and never touch the network
/// - Remote exhaustion falls back to local simulation exactly once
/// - Execution time is wall-clock from just before the first attempt
/// - The endpoint list is resolved per request, never cached
use crate::error::{ExecuteError, TransportError};
use crate::normalizer::normalize;
use crate::remote::{HttpTransport, RemoteClient, RemoteOutcome, Transport};
use crate::simulate;
use coderun_common::config::endpoints_from_env;
use coderun_common::{Config, ExecutionRequest, ExecutionResult, LanguageRegistry, LanguageSpec};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Where the ordered endpoint list comes from; consulted once per request
pub trait EndpointSource: Send + Sync {
    fn endpoints(&self) -> Vec<String>;
}

/// Fixed list
impl EndpointSource for Vec<String> {
    fn endpoints(&self) -> Vec<String> {
        self.clone()
    }
}

impl<S: EndpointSource + ?Sized> EndpointSource for Arc<S> {
    fn endpoints(&self) -> Vec<String> {
        (**self).endpoints()
    }
}

/// Re-reads `EXECUTION_ENDPOINTS` on every request
pub struct EnvEndpoints;

impl EndpointSource for EnvEndpoints {
    fn endpoints(&self) -> Vec<String> {
        endpoints_from_env()
    }
}

pub struct Executor<T: Transport = HttpTransport> {
    registry: LanguageRegistry,
    endpoints: Box<dyn EndpointSource>,
    remote: RemoteClient<T>,
}

impl Executor<HttpTransport> {
    pub fn from_config(config: &Config, registry: LanguageRegistry) -> Result<Self, TransportError> {
        Ok(Self::new(registry, EnvEndpoints, RemoteClient::from_config(config)?))
    }
}

impl<T: Transport> Executor<T> {
    pub fn new(
        registry: LanguageRegistry,
        endpoints: impl EndpointSource + 'static,
        remote: RemoteClient<T>,
    ) -> Self {
        Self {
            registry,
            endpoints: Box::new(endpoints),
            remote,
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Endpoint list as it would be used by a request made now
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.endpoints()
    }

    /// Run one request through the full remote-then-fallback chain
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecuteError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "execute",
            request_id = %request_id,
            language = %request.language.trim(),
        );

        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecuteError> {
        let spec = self.resolve(request)?;

        if spec.preview {
            tracing::info!("Preview language, echoing source");
            return Ok(ExecutionResult::succeeded(request.code.clone()).preview());
        }

        let endpoints = self.endpoints.endpoints();
        if endpoints.is_empty() {
            tracing::error!("No execution endpoints configured");
            return Err(ExecuteError::NoEndpoints);
        }

        let started = Instant::now();
        let outcome = self
            .remote
            .execute(&endpoints, spec, &request.code, &request.stdin)
            .await;

        let result = match outcome {
            RemoteOutcome::Completed {
                endpoint, attempts, response,
            } => {
                tracing::info!(endpoint = %endpoint, attempts, "Remote execution completed");
                normalize(&response)
            }
            RemoteOutcome::Exhausted { attempts } => {
                tracing::warn!(attempts, "All endpoints failed, falling back to local simulation");
                self.fallback(spec, request).await
            }
        };

        let result = result.with_time(elapsed_ms(started));
        tracing::info!(
            success = result.success,
            mode = %result.mode(),
            time_ms = result.execution_time_ms,
            "Execution finished"
        );

        Ok(result)
    }

    /// Skip the endpoints entirely and run the local simulator
    pub async fn simulate_only(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecuteError> {
        let spec = self.resolve(request)?;

        if spec.preview {
            return Ok(ExecutionResult::succeeded(request.code.clone()).preview());
        }

        let started = Instant::now();
        let result = self.fallback(spec, request).await;
        Ok(result.with_time(elapsed_ms(started)))
    }

    fn resolve(&self, request: &ExecutionRequest) -> Result<&LanguageSpec, ExecuteError> {
        if request.code.trim().is_empty() {
            return Err(ExecuteError::MissingCode);
        }

        let language = request.language.trim();
        if language.is_empty() {
            return Err(ExecuteError::MissingLanguage);
        }

        self.registry.lookup(language).map_err(|_| {
            tracing::info!(language = %language, "Rejected unsupported language");
            ExecuteError::UnsupportedLanguage(language.to_string())
        })
    }

    async fn fallback(&self, spec: &LanguageSpec, request: &ExecutionRequest) -> ExecutionResult {
        let spec = spec.clone();
        let code = request.code.clone();
        let stdin = request.stdin.clone();

        // Simulation is CPU-bound; keep it off the async workers
        match tokio::task::spawn_blocking(move || simulate::simulate(&spec, &code, &stdin)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Simulation task failed");
                ExecutionResult::failed("", format!("Simulation failed: {}", e)).simulated()
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts calls and answers from a script; runs out into connection refused
    struct FakeTransport {
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
        replies: Vec<Result<Value, u16>>,
    }

    impl FakeTransport {
        fn new(replies: Vec<Result<Value, u16>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
                replies,
            }
        }

        fn down() -> Self {
            Self::new(Vec::new())
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn post_json(&self, url: &str, _body: &Value) -> Result<Value, TransportError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());

            match self.replies.get(index) {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(status)) => Err(TransportError::Status(*status)),
                None => Err(TransportError::Network("connection refused".to_string())),
            }
        }
    }

    fn config(endpoints: &[&str]) -> Config {
        Config {
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            run_timeout_ms: 10_000,
            compile_timeout_ms: 10_000,
            attempt_deadline_ms: 1_000,
            language_config_path: None,
        }
    }

    fn executor(endpoints: &[&str], transport: FakeTransport) -> Executor<FakeTransport> {
        let config = config(endpoints);
        Executor::new(
            LanguageRegistry::builtin(),
            config.endpoints.clone(),
            RemoteClient::with_transport(transport, &config),
        )
    }

    fn calls(executor: &Executor<FakeTransport>) -> usize {
        executor.remote.transport().calls()
    }

    #[tokio::test]
    async fn test_preview_languages_never_touch_the_network() {
        let executor = executor(&["http://a"], FakeTransport::down());

        for language in ["html", "CSS"] {
            let code = "<h1>Hi</h1>\n  <p>keep   spacing</p>\n";
            let request = ExecutionRequest::new(language, code);
            let result = executor.execute(&request).await.unwrap();

            assert!(result.success);
            assert_eq!(result.output, code);
            assert_eq!(result.error, "");
            assert_eq!(result.execution_time_ms, 0);
            assert_eq!(result.is_preview, Some(true));
            assert_eq!(result.is_simulated, None);
        }

        assert_eq!(calls(&executor), 0);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let executor = executor(&["http://a"], FakeTransport::down());

        let missing_code = executor.execute(&ExecutionRequest::new("python", "   ")).await;
        assert_eq!(missing_code, Err(ExecuteError::MissingCode));

        let missing_language = executor.execute(&ExecutionRequest::new("", "print(1)")).await;
        assert_eq!(missing_language, Err(ExecuteError::MissingLanguage));

        let unknown = executor.execute(&ExecutionRequest::new("cobol", "DISPLAY 1")).await;
        assert_eq!(unknown, Err(ExecuteError::UnsupportedLanguage("cobol".to_string())));

        assert_eq!(calls(&executor), 0);
    }

    #[tokio::test]
    async fn test_substring_languages_are_not_matched() {
        let executor = executor(&["http://a"], FakeTransport::down());

        let result = executor.execute(&ExecutionRequest::new("xhtml", "<p>")).await;
        assert_eq!(result, Err(ExecuteError::UnsupportedLanguage("xhtml".to_string())));
    }

    #[tokio::test]
    async fn test_remote_success_is_normalized() {
        let transport = FakeTransport::new(vec![Ok(json!({
            "run": { "stdout": "hi\n", "stderr": "", "code": 0 }
        }))]);
        let executor = executor(&["http://a"], transport);

        let result = executor
            .execute(&ExecutionRequest::new("Python", "print('hi')"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "hi");
        assert_eq!(result.error, "");
        assert_eq!(result.is_simulated, None);
        assert_eq!(calls(&executor), 1);
    }

    #[tokio::test]
    async fn test_remote_compile_failure_is_a_normal_result() {
        let transport = FakeTransport::new(vec![Ok(json!({
            "compile": { "stdout": "", "stderr": "syntax error" }
        }))]);
        let executor = executor(&["http://a"], transport);

        let result = executor
            .execute(&ExecutionRequest::new("cpp", "int main( {"))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error, "syntax error");
        assert_eq!(result.is_simulated, None);
    }

    #[tokio::test]
    async fn test_failover_stops_at_first_success() {
        let transport = FakeTransport::new(vec![
            Err(503),
            Ok(json!("not an object")),
            Ok(json!({ "run": { "stdout": "3", "stderr": "", "code": 0 } })),
        ]);
        let executor = executor(&["http://a", "http://b", "http://c", "http://d"], transport);

        let result = executor
            .execute(&ExecutionRequest::new("javascript", "console.log(1+2)"))
            .await
            .unwrap();

        assert_eq!(result.output, "3");
        assert_eq!(result.is_simulated, None);
        assert_eq!(calls(&executor), 3);

        let urls = executor.remote.transport().urls.lock().unwrap().clone();
        assert_eq!(urls, vec!["http://a/execute", "http://b/execute", "http://c/execute"]);
    }

    #[tokio::test]
    async fn test_exhaustion_falls_back_once() {
        let executor = executor(&["http://a", "http://b", "http://c"], FakeTransport::down());

        let result = executor
            .execute(&ExecutionRequest::new("js", "console.log(1+2)"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "3");
        assert_eq!(result.is_simulated, Some(true));
        assert_eq!(calls(&executor), 3);
    }

    #[tokio::test]
    async fn test_fallback_failure_is_not_retried() {
        let executor = executor(&["http://a", "http://b"], FakeTransport::down());

        let result = executor
            .execute(&ExecutionRequest::new("java", "class Main {}"))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.output, "");
        assert_eq!(result.error, simulate::unavailable_message("java"));
        assert_eq!(result.is_simulated, Some(true));
        assert_eq!(calls(&executor), 2);
    }

    #[tokio::test]
    async fn test_fallback_passes_stdin_to_python() {
        let executor = executor(&["http://a"], FakeTransport::down());
        let request = ExecutionRequest::new("python", "name = input()\nprint(f\"hi {name}\")").with_stdin("Ada\n");

        let result = executor.execute(&request).await.unwrap();

        assert_eq!(result.output, "hi Ada");
        assert_eq!(result.is_simulated, Some(true));
    }

    #[tokio::test]
    async fn test_no_endpoints_is_a_server_error() {
        let executor = executor(&[], FakeTransport::down());

        let result = executor.execute(&ExecutionRequest::new("python", "print(1)")).await;
        assert_eq!(result, Err(ExecuteError::NoEndpoints));
        assert!(!ExecuteError::NoEndpoints.is_client_error());

        // Preview still works without a backend
        let preview = executor.execute(&ExecutionRequest::new("html", "<b>x</b>")).await;
        assert!(preview.unwrap().success);
    }

    #[tokio::test]
    async fn test_execute_is_idempotent() {
        let reply = json!({ "run": { "stdout": "same\n", "stderr": "", "code": 0 } });
        let transport = FakeTransport::new(vec![Ok(reply.clone()), Ok(reply)]);
        let executor = executor(&["http://a"], transport);
        let request = ExecutionRequest::new("ruby", "puts 'same'");

        let first = executor.execute(&request).await.unwrap();
        let second = executor.execute(&request).await.unwrap();

        assert_eq!(first.output, second.output);
        assert_eq!(first.error, second.error);
        assert_eq!(first.success, second.success);
        assert_eq!(first.mode(), second.mode());
    }

    /// Endpoint list that can be edited while the executor is live
    struct SharedEndpoints(Mutex<Vec<String>>);

    impl EndpointSource for SharedEndpoints {
        fn endpoints(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_endpoint_list_is_read_per_request() {
        let reply = json!({ "run": { "stdout": "ok", "stderr": "", "code": 0 } });
        let transport = FakeTransport::new(vec![Ok(reply.clone()), Ok(reply)]);
        let source = Arc::new(SharedEndpoints(Mutex::new(vec!["http://old".to_string()])));
        let config = config(&[]);
        let executor = Executor::new(
            LanguageRegistry::builtin(),
            source.clone(),
            RemoteClient::with_transport(transport, &config),
        );
        let request = ExecutionRequest::new("python", "print('ok')");

        executor.execute(&request).await.unwrap();
        *source.0.lock().unwrap() = vec!["http://new".to_string()];
        executor.execute(&request).await.unwrap();

        let urls = executor.remote.transport().urls.lock().unwrap().clone();
        assert_eq!(urls, vec!["http://old/execute", "http://new/execute"]);
        assert_eq!(executor.endpoints(), vec!["http://new"]);
    }

    #[tokio::test]
    async fn test_endpoint_list_emptied_at_runtime() {
        let source = Arc::new(SharedEndpoints(Mutex::new(vec!["http://a".to_string()])));
        let config = config(&[]);
        let executor = Executor::new(
            LanguageRegistry::builtin(),
            source.clone(),
            RemoteClient::with_transport(FakeTransport::down(), &config),
        );

        source.0.lock().unwrap().clear();
        let result = executor.execute(&ExecutionRequest::new("python", "print(1)")).await;
        assert_eq!(result, Err(ExecuteError::NoEndpoints));
    }

    #[tokio::test]
    async fn test_simulate_only_skips_endpoints() {
        let executor = executor(&["http://a"], FakeTransport::down());

        let result = executor
            .simulate_only(&ExecutionRequest::new("cpp", "std::cout << \"hi\" << std::endl;"))
            .await
            .unwrap();

        assert_eq!(result.output, "hi");
        assert_eq!(result.is_simulated, Some(true));
        assert_eq!(calls(&executor), 0);
    }
}
