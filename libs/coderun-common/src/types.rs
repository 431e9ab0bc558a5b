use serde::{Deserialize, Serialize};
use std::fmt;

/// Local simulator families
/// Only these three have an offline approximation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorKind {
    Javascript,
    Python,
    Cpp,
}

impl SimulatorKind {
    pub fn from_str(s: &str) -> Option<SimulatorKind> {
        match s.to_lowercase().as_str() {
            "javascript" => Some(SimulatorKind::Javascript),
            "python" => Some(SimulatorKind::Python),
            "cpp" => Some(SimulatorKind::Cpp),
            _ => None,
        }
    }
}

impl fmt::Display for SimulatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorKind::Javascript => write!(f, "javascript"),
            SimulatorKind::Python => write!(f, "python"),
            SimulatorKind::Cpp => write!(f, "cpp"),
        }
    }
}

/// Language Specification (Immutable)
/// Maps a logical language id onto the runtime name/version pair
/// the remote backend expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    pub id: String,
    pub runtime: String,
    pub version: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Preview-only languages are rendered by the browser and never executed
    #[serde(default)]
    pub preview: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulator: Option<SimulatorKind>,
}

impl LanguageSpec {
    pub fn new(id: &str, runtime: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            runtime: runtime.to_string(),
            version: version.to_string(),
            aliases: Vec::new(),
            preview: false,
            simulator: None,
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_simulator(mut self, kind: SimulatorKind) -> Self {
        self.simulator = Some(kind);
        self
    }

    pub fn preview_only(mut self) -> Self {
        self.preview = true;
        self
    }

    /// Exact case-insensitive match against the id or any alias
    pub fn matches(&self, name: &str) -> bool {
        self.id.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for LanguageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.id, self.runtime, self.version)
    }
}

/// Execution Request (per call, never persisted)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub stdin: String,
}

impl ExecutionRequest {
    pub fn new(language: &str, code: &str) -> Self {
        Self {
            code: code.to_string(),
            language: language.to_string(),
            stdin: String::new(),
        }
    }

    pub fn with_stdin(mut self, stdin: &str) -> Self {
        self.stdin = stdin.to_string();
        self
    }
}

/// How a result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Remote,
    Simulated,
    Preview,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Remote => write!(f, "remote"),
            ExecutionMode::Simulated => write!(f, "simulated"),
            ExecutionMode::Preview => write!(f, "preview"),
        }
    }
}

/// Execution Output
/// Built fresh for every call; no identity beyond one request/response cycle
///
/// ## Success Semantics:
/// - success is true only for exit code 0 with no stderr
/// - output and error may both be empty (empty program)
/// - is_simulated marks approximate output that must never count as proof of correctness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    pub execution_time_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_simulated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_preview: Option<bool>,
}

impl ExecutionResult {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: String::new(),
            execution_time_ms: 0,
            success: true,
            is_simulated: None,
            is_preview: None,
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: error.into(),
            execution_time_ms: 0,
            success: false,
            is_simulated: None,
            is_preview: None,
        }
    }

    pub fn simulated(mut self) -> Self {
        self.is_simulated = Some(true);
        self
    }

    pub fn preview(mut self) -> Self {
        self.is_preview = Some(true);
        self
    }

    pub fn with_time(mut self, execution_time_ms: u64) -> Self {
        self.execution_time_ms = execution_time_ms;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        if self.is_preview == Some(true) {
            ExecutionMode::Preview
        } else if self.is_simulated == Some(true) {
            ExecutionMode::Simulated
        } else {
            ExecutionMode::Remote
        }
    }
}
