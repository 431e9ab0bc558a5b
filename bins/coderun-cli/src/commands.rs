// CLI commands for running code and managing the language table
use anyhow::{bail, Context, Result};
use coderun_common::{
    languages::LanguagesFile, Config, ExecutionRequest, ExecutionResult, LanguageRegistry, LanguageSpec,
    SimulatorKind,
};
use coderun_engine::Executor;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_LANGUAGES_PATH: &str = "config/languages.json";

/// Table edited by add-lang/remove-lang: LANGUAGE_CONFIG_PATH or the default
pub fn languages_path(config: &Config) -> PathBuf {
    config
        .language_config_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LANGUAGES_PATH))
}

/// Load the language table, seeded from the built-in one when the file is absent
fn load_languages_config(path: &Path) -> Result<LanguagesFile> {
    if !path.exists() {
        return Ok(LanguageRegistry::builtin().to_file());
    }

    let registry = LanguageRegistry::load_from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(registry.to_file())
}

/// Save the language table
fn save_languages_config(path: &Path, config: &LanguagesFile) -> Result<()> {
    // Ensure config directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json_content = serde_json::to_string_pretty(config).context("Failed to serialize language table")?;

    fs::write(path, json_content).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Registry the `run` and `list-langs` commands operate on
fn active_registry(path: &Path) -> Result<LanguageRegistry> {
    let file = load_languages_config(path)?;
    LanguageRegistry::new(file.languages).context("Invalid language table")
}

/// Run a source file through the facade; returns whether execution succeeded
pub async fn run_file(
    config: &Config,
    language: &str,
    file: &Path,
    stdin_file: Option<&Path>,
    offline: bool,
    json: bool,
) -> Result<bool> {
    let code = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let stdin = match stdin_file {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let registry = active_registry(&languages_path(config))?;
    let executor = Executor::from_config(config, registry).context("Failed to build HTTP client")?;
    let request = ExecutionRequest::new(language, &code).with_stdin(&stdin);

    let result = if offline {
        executor.simulate_only(&request).await?
    } else {
        executor.execute(&request).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_result(&result));
    }

    Ok(result.success)
}

/// Human-readable rendering: output, error, then a one-line summary
pub fn render_result(result: &ExecutionResult) -> String {
    let mut rendered = String::new();

    if !result.output.is_empty() {
        rendered.push_str(&result.output);
        rendered.push('\n');
    }
    if !result.error.is_empty() {
        rendered.push_str(&result.error);
        rendered.push('\n');
    }

    let status = if result.success { "ok" } else { "failed" };
    rendered.push_str(&format!(
        "\n[{} | {} | {} ms]\n",
        status,
        result.mode(),
        result.execution_time_ms
    ));

    if result.is_simulated == Some(true) {
        rendered.push_str("Note: simulated locally, output is approximate\n");
    }

    rendered
}

/// Add a new language to the table
pub fn add_language(
    path: &Path,
    name: &str,
    runtime: &str,
    version: &str,
    aliases: &[String],
    preview: bool,
    simulator: Option<&str>,
) -> Result<()> {
    println!("Adding language: {}", name);

    // Validate inputs
    if name.trim().is_empty() || runtime.trim().is_empty() || version.trim().is_empty() {
        bail!("Language name, runtime and version cannot be empty");
    }

    let simulator = match simulator {
        Some(kind) => Some(
            SimulatorKind::from_str(kind)
                .ok_or_else(|| anyhow::anyhow!("Unknown simulator '{}' (expected javascript, python or cpp)", kind))?,
        ),
        None => None,
    };

    let mut languages_json = load_languages_config(path)?;

    let alias_refs: Vec<&str> = aliases.iter().map(|a| a.as_str()).collect();
    let mut spec = LanguageSpec::new(name.trim(), runtime.trim(), version.trim()).with_aliases(&alias_refs);
    spec.preview = preview;
    spec.simulator = simulator;

    languages_json.languages.push(spec);

    // Duplicate ids and aliases are rejected the same way the services reject them
    let registry = LanguageRegistry::new(languages_json.languages).context("Cannot add language")?;

    println!("Updating {}...", path.display());
    save_languages_config(path, &registry.to_file())?;

    println!("Language '{}' added successfully!", name);
    Ok(())
}

/// Remove a language from the table
pub fn remove_language(path: &Path, name: &str, yes: bool) -> Result<()> {
    println!("Removing language: {}", name);

    let mut languages_json = load_languages_config(path)?;

    let lang_index = languages_json
        .languages
        .iter()
        .position(|l| l.matches(name.trim()))
        .ok_or_else(|| anyhow::anyhow!("Language '{}' not found in {}", name, path.display()))?;

    if languages_json.languages.len() == 1 {
        bail!("Cannot remove the last language in the table");
    }

    // Confirm deletion
    if !yes {
        print!("This will remove '{}' from {}\nContinue? (y/N): ", languages_json.languages[lang_index], path.display());
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted");
            return Ok(());
        }
    }

    let removed = languages_json.languages.remove(lang_index);
    println!("Updating {}...", path.display());
    save_languages_config(path, &languages_json)?;

    println!("Language '{}' removed successfully!", removed.id);
    Ok(())
}

/// List all configured languages
pub fn list_languages(path: &Path) -> Result<()> {
    let registry = active_registry(path)?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        "built-in table".to_string()
    };

    println!("Configured Languages ({}):\n", source);
    println!(
        "{:<12} {:<12} {:<10} {:<20} {:<10}",
        "Name", "Runtime", "Version", "Aliases", "Mode"
    );
    println!("{}", "─".repeat(70));

    for lang in registry.languages() {
        let mode = if lang.preview {
            "preview".to_string()
        } else if let Some(kind) = lang.simulator {
            format!("sim:{}", kind)
        } else {
            "remote".to_string()
        };

        println!(
            "{:<12} {:<12} {:<10} {:<20} {:<10}",
            lang.id,
            lang.runtime,
            lang.version,
            lang.aliases.join(","),
            mode
        );
    }

    println!("\nTotal: {} language(s)", registry.languages().len());

    Ok(())
}
