pub mod types;
pub mod languages;
pub mod config;

// Re-export commonly used types for convenience
pub use types::{ExecutionMode, ExecutionRequest, ExecutionResult, LanguageSpec, SimulatorKind};
pub use languages::{LanguageRegistry, RegistryError};
pub use config::{Config, ConfigError};
