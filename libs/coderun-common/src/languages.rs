use crate::types::{LanguageSpec, SimulatorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unsupported language: {0}")]
    NotFound(String),

    #[error("Failed to read language table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse language table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate language name in table: {0}")]
    Duplicate(String),

    #[error("Language table is empty")]
    Empty,

    #[error("Only html and css may be preview-only; {0} is misconfigured")]
    PreviewMismatch(String),
}

/// Logical ids rendered by the browser instead of executed
pub const PREVIEW_LANGUAGES: [&str; 2] = ["html", "css"];

fn is_preview_id(id: &str) -> bool {
    PREVIEW_LANGUAGES.iter().any(|p| p.eq_ignore_ascii_case(id.trim()))
}

/// On-disk shape of the language table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesFile {
    pub languages: Vec<LanguageSpec>,
}

/// Language Registry
/// Exact-match table from logical language id to backend runtime.
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: Vec<LanguageSpec>,
}

impl LanguageRegistry {
    /// Build a registry, rejecting duplicate ids or aliases
    pub fn new(languages: Vec<LanguageSpec>) -> Result<Self, RegistryError> {
        if languages.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for spec in &languages {
            if spec.preview != is_preview_id(&spec.id) {
                return Err(RegistryError::PreviewMismatch(spec.id.clone()));
            }
            for name in std::iter::once(&spec.id).chain(spec.aliases.iter()) {
                if !seen.insert(name.to_lowercase()) {
                    return Err(RegistryError::Duplicate(name.clone()));
                }
            }
        }

        Ok(Self { languages })
    }

    /// Built-in table used when no language config file is supplied
    pub fn builtin() -> Self {
        Self {
            languages: builtin_languages(),
        }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, RegistryError> {
        let file: LanguagesFile = serde_json::from_str(content)?;
        let registry = Self::new(file.languages)?;
        tracing::debug!(count = registry.languages.len(), "Loaded language table");
        Ok(registry)
    }

    /// Case-insensitive lookup by id or alias
    pub fn lookup(&self, name: &str) -> Result<&LanguageSpec, RegistryError> {
        let name = name.trim();
        self.languages
            .iter()
            .find(|spec| spec.matches(name))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn is_preview_language(&self, name: &str) -> bool {
        self.lookup(name).map(|spec| spec.preview).unwrap_or(false)
    }

    pub fn languages(&self) -> &[LanguageSpec] {
        &self.languages
    }

    pub fn to_file(&self) -> LanguagesFile {
        LanguagesFile {
            languages: self.languages.clone(),
        }
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_languages() -> Vec<LanguageSpec> {
    vec![
        LanguageSpec::new("python", "python", "3.10.0")
            .with_aliases(&["py", "python3"])
            .with_simulator(SimulatorKind::Python),
        LanguageSpec::new("javascript", "javascript", "18.15.0")
            .with_aliases(&["js", "node"])
            .with_simulator(SimulatorKind::Javascript),
        LanguageSpec::new("typescript", "typescript", "5.0.3").with_aliases(&["ts"]),
        LanguageSpec::new("java", "java", "15.0.2"),
        LanguageSpec::new("c", "c", "10.2.0"),
        LanguageSpec::new("cpp", "c++", "10.2.0")
            .with_aliases(&["c++"])
            .with_simulator(SimulatorKind::Cpp),
        LanguageSpec::new("csharp", "csharp", "6.12.0").with_aliases(&["c#", "cs"]),
        LanguageSpec::new("ruby", "ruby", "3.0.1").with_aliases(&["rb"]),
        LanguageSpec::new("go", "go", "1.16.2").with_aliases(&["golang"]),
        LanguageSpec::new("rust", "rust", "1.68.2").with_aliases(&["rs"]),
        LanguageSpec::new("php", "php", "8.2.3"),
        LanguageSpec::new("kotlin", "kotlin", "1.8.20").with_aliases(&["kt"]),
        LanguageSpec::new("swift", "swift", "5.3.3"),
        LanguageSpec::new("bash", "bash", "5.2.0").with_aliases(&["sh"]),
        LanguageSpec::new("html", "html", "5").preview_only(),
        LanguageSpec::new("css", "css", "3").preview_only(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_lookup_case_insensitive() {
        let registry = LanguageRegistry::builtin();

        for name in ["python", "Python", "PYTHON", " python "] {
            let spec = registry.lookup(name).unwrap();
            assert_eq!(spec.runtime, "python");
            assert_eq!(spec.version, "3.10.0");
        }
    }

    #[test]
    fn test_lookup_is_stable_for_every_language() {
        let registry = LanguageRegistry::builtin();

        for spec in registry.languages() {
            let upper = registry.lookup(&spec.id.to_uppercase()).unwrap();
            let lower = registry.lookup(&spec.id.to_lowercase()).unwrap();
            assert_eq!(upper, lower);
            assert_eq!(upper.runtime, spec.runtime);
            assert_eq!(upper.version, spec.version);
        }
    }

    #[test]
    fn test_lookup_unknown_fails() {
        let registry = LanguageRegistry::builtin();

        for name in ["", "cobol", "pyth", "javascriptx", "h"] {
            assert!(matches!(registry.lookup(name), Err(RegistryError::NotFound(_))));
        }
    }

    #[test]
    fn test_no_substring_matching() {
        let registry = LanguageRegistry::builtin();

        // "c" must not resolve to cpp/csharp and "htm" must not resolve to html
        assert_eq!(registry.lookup("c").unwrap().id, "c");
        assert!(registry.lookup("htm").is_err());
        assert!(!registry.is_preview_language("xhtml"));
    }

    #[test]
    fn test_cpp_runtime_name() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.lookup("cpp").unwrap().runtime, "c++");
        assert_eq!(registry.lookup("C++").unwrap().id, "cpp");
    }

    #[test]
    fn test_preview_languages_exactly_html_css() {
        let registry = LanguageRegistry::builtin();

        let previews: Vec<&str> = registry
            .languages()
            .iter()
            .filter(|spec| spec.preview)
            .map(|spec| spec.id.as_str())
            .collect();
        assert_eq!(previews, vec!["html", "css"]);

        assert!(registry.is_preview_language("HTML"));
        assert!(registry.is_preview_language("css"));
        assert!(!registry.is_preview_language("javascript"));
        assert!(!registry.is_preview_language("unknown"));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let languages = vec![
            LanguageSpec::new("python", "python", "3.10.0").with_aliases(&["py"]),
            LanguageSpec::new("pypy", "pypy", "3.9").with_aliases(&["PY"]),
        ];

        assert!(matches!(
            LanguageRegistry::new(languages),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"languages": [
                {{"id": "lua", "runtime": "lua", "version": "5.4.4"}},
                {{"id": "html", "runtime": "html", "version": "5", "preview": true}},
                {{"id": "python", "runtime": "python", "version": "3.12.0", "simulator": "python"}}
            ]}}"#
        )
        .unwrap();

        let registry = LanguageRegistry::load_from_file(file.path()).unwrap();
        assert_eq!(registry.languages().len(), 3);
        assert_eq!(registry.lookup("LUA").unwrap().version, "5.4.4");
        assert!(registry.is_preview_language("html"));
        assert_eq!(
            registry.lookup("python").unwrap().simulator,
            Some(SimulatorKind::Python)
        );
        assert!(registry.lookup("javascript").is_err());
    }

    #[test]
    fn test_preview_flag_pinned_to_html_and_css() {
        let python_preview = r#"{"languages": [{"id": "python", "runtime": "python", "version": "3", "preview": true}]}"#;
        assert!(matches!(
            LanguageRegistry::from_json(python_preview),
            Err(RegistryError::PreviewMismatch(id)) if id == "python"
        ));

        let html_executed = r#"{"languages": [{"id": "html", "runtime": "html", "version": "5"}]}"#;
        assert!(matches!(
            LanguageRegistry::from_json(html_executed),
            Err(RegistryError::PreviewMismatch(id)) if id == "html"
        ));

        let css_preview = r#"{"languages": [{"id": "CSS", "runtime": "css", "version": "3", "preview": true}]}"#;
        assert!(LanguageRegistry::from_json(css_preview).unwrap().is_preview_language("css"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = LanguageRegistry::load_from_file("/nonexistent/languages.json").unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(matches!(
            LanguageRegistry::from_json(r#"{"languages": []}"#),
            Err(RegistryError::Empty)
        ));
    }
}
