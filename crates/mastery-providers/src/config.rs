//! Configuration loading and evaluator factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mastery_core::engine::EngineConfig;
use mastery_core::evaluator::{DelegatedConfig, DelegatedEvaluator, LocalEvaluator};
use mastery_core::identity::DEFAULT_BLOCKS;
use mastery_core::sampling::MilestoneConfig;
use mastery_core::traits::{Evaluator, TutorModel};

use crate::anthropic::AnthropicTutor;
use crate::mock::MockTutor;
use crate::ollama::OllamaTutor;
use crate::openai::OpenAiTutor;

/// Name of the built-in evaluator that never leaves the process.
pub const LOCAL_EVALUATOR: &str = "local";

/// Configuration for a single tutor backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Scripted replies; for demos and tests.
    Mock {
        #[serde(default)]
        replies: Vec<String>,
        #[serde(default)]
        default_reply: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock {
                replies,
                default_reply,
            } => f
                .debug_struct("Mock")
                .field("replies", &replies.len())
                .field("default_reply", default_reply)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level `mastery.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryConfig {
    /// Catalog file or directory of catalog files.
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
    /// Root directory of the file ledger.
    #[serde(default = "default_ledger_dir")]
    pub ledger_dir: PathBuf,
    /// Blocks a student may log in under.
    #[serde(default = "default_blocks")]
    pub blocks: Vec<String>,
    /// `local`, or the name of an entry in `providers`.
    #[serde(default = "default_evaluator")]
    pub evaluator: String,
    /// Model requested from the tutor backend.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Tutor backends keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub milestone: MilestoneConfig,
    #[serde(default)]
    pub delegated: DelegatedConfig,
}

fn default_catalog() -> PathBuf {
    PathBuf::from("vocab")
}
fn default_ledger_dir() -> PathBuf {
    PathBuf::from("mastery-data")
}
fn default_blocks() -> Vec<String> {
    DEFAULT_BLOCKS.iter().map(|b| b.to_string()).collect()
}
fn default_evaluator() -> String {
    LOCAL_EVALUATOR.to_string()
}
fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            ledger_dir: default_ledger_dir(),
            blocks: default_blocks(),
            evaluator: default_evaluator(),
            default_model: default_model(),
            providers: HashMap::new(),
            engine: EngineConfig::default(),
            milestone: MilestoneConfig::default(),
            delegated: DelegatedConfig::default(),
        }
    }
}

impl MasteryConfig {
    /// Engine settings with the top-level `blocks` and `[milestone]` applied.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            blocks: self.blocks.clone(),
            milestone: self.milestone.clone(),
            ..self.engine.clone()
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are inserted as-is and never scanned again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + len];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock { .. } => config.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `mastery.toml` in the current directory
/// 2. `~/.config/mastery/config.toml`
///
/// Environment variable overrides: `MASTERY_OPENAI_KEY`, `MASTERY_ANTHROPIC_KEY`.
pub fn load_config() -> Result<MasteryConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<MasteryConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("mastery.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let mut config = parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            // relative catalog and ledger paths are relative to the config file
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                if config.catalog.is_relative() {
                    config.catalog = dir.join(&config.catalog);
                }
                if config.ledger_dir.is_relative() {
                    config.ledger_dir = dir.join(&config.ledger_dir);
                }
            }
            config
        }
        None => MasteryConfig::default(),
    };

    apply_env_overrides(&mut config);

    tracing::debug!(path = ?config_path, evaluator = %config.evaluator, "configuration loaded");
    Ok(config)
}

/// Parse a config document and resolve `${VAR}` references in providers.
pub fn parse_config(content: &str) -> Result<MasteryConfig> {
    let mut config: MasteryConfig = toml::from_str(content)?;
    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    Ok(config)
}

fn apply_env_overrides(config: &mut MasteryConfig) {
    if let Ok(key) = std::env::var("MASTERY_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("MASTERY_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("mastery"))
}

/// Create a tutor model from its configuration.
pub fn create_tutor_model(config: &ProviderConfig) -> Result<Arc<dyn TutorModel>> {
    let tutor: Arc<dyn TutorModel> = match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            Arc::new(AnthropicTutor::new(api_key, base_url.clone())?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(OpenAiTutor::new(api_key, base_url.clone(), org_id.clone())?),
        ProviderConfig::Ollama { base_url } => Arc::new(OllamaTutor::new(base_url)?),
        ProviderConfig::Mock {
            replies,
            default_reply,
        } => {
            let mut mock = MockTutor::with_replies(replies.iter().cloned());
            if let Some(reply) = default_reply {
                mock = mock.default_reply(reply);
            }
            Arc::new(mock)
        }
    };
    Ok(tutor)
}

/// Build the evaluator named by `config.evaluator`.
pub fn build_evaluator(config: &MasteryConfig) -> Result<Arc<dyn Evaluator>> {
    if config.evaluator == LOCAL_EVALUATOR {
        return Ok(Arc::new(LocalEvaluator::new()));
    }

    let provider = config.providers.get(&config.evaluator).with_context(|| {
        let mut known: Vec<_> = config.providers.keys().map(String::as_str).collect();
        known.sort_unstable();
        format!(
            "unknown evaluator '{}' (expected '{LOCAL_EVALUATOR}' or one of: {})",
            config.evaluator,
            known.join(", ")
        )
    })?;

    let tutor = create_tutor_model(provider)
        .with_context(|| format!("failed to set up provider '{}'", config.evaluator))?;
    tracing::info!(
        provider = %config.evaluator,
        model = %config.default_model,
        "using delegated evaluator"
    );
    Ok(Arc::new(DelegatedEvaluator::new(
        tutor,
        config.default_model.clone(),
        config.delegated.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mastery_core::sampling::SamplingMode;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_MASTERY_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_MASTERY_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_MASTERY_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("no vars"), "no vars");
        assert_eq!(resolve_env_vars("${UNCLOSED"), "${UNCLOSED");
        std::env::remove_var("_MASTERY_TEST_VAR");
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        std::env::set_var("_MASTERY_SELF_REF", "${_MASTERY_SELF_REF}");
        std::env::set_var("_MASTERY_KEY_PART", "sk-${_MASTERY_SELF_REF}");
        assert_eq!(
            resolve_env_vars("${_MASTERY_SELF_REF}"),
            "${_MASTERY_SELF_REF}"
        );
        assert_eq!(
            resolve_env_vars("${_MASTERY_KEY_PART}/${_MASTERY_MISSING}!"),
            "sk-${_MASTERY_SELF_REF}/!"
        );
        std::env::remove_var("_MASTERY_SELF_REF");
        std::env::remove_var("_MASTERY_KEY_PART");
    }

    #[test]
    fn default_config() {
        let config = MasteryConfig::default();
        assert_eq!(config.evaluator, "local");
        assert_eq!(config.blocks, vec!["First", "Second", "Fourth"]);
        assert!(!config.engine.retest_mastered);
        assert_eq!(config.milestone.terms_per_unit, 3);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
catalog = "units"
blocks = ["First", "Third"]
evaluator = "openai"
default_model = "gpt-4.1"

[engine]
retest_mastered = true
persist_retries = 5

[milestone]
terms_per_unit = 2
sampling = "fresh"

[delegated]
markers = ["correct"]
timeout_secs = 10

[providers.openai]
type = "openai"
api_key = "sk-openai"

[providers.local-llm]
type = "ollama"
"#;
        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.catalog, PathBuf::from("units"));
        assert_eq!(config.providers.len(), 2);
        assert!(matches!(
            config.providers.get("local-llm"),
            Some(ProviderConfig::Ollama { base_url }) if base_url == "http://localhost:11434"
        ));
        assert_eq!(config.delegated.markers, vec!["correct"]);
        assert_eq!(config.delegated.transcript_window, 8);

        let engine = config.engine_config();
        assert!(engine.retest_mastered);
        assert_eq!(engine.persist_retries, 5);
        assert_eq!(engine.retry_delay_ms, 200);
        assert_eq!(engine.blocks, vec!["First", "Third"]);
        assert_eq!(engine.milestone.terms_per_unit, 2);
        assert_eq!(engine.milestone.sampling, SamplingMode::Fresh);
    }

    #[test]
    fn api_keys_are_masked_in_debug() {
        let config = ProviderConfig::Anthropic {
            api_key: "sk-secret".into(),
            base_url: None,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/mastery.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastery.toml");
        std::fs::write(&path, "catalog = \"vocab\"\nledger_dir = \"/abs/ledger\"\n").unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.catalog, dir.path().join("vocab"));
        assert_eq!(config.ledger_dir, PathBuf::from("/abs/ledger"));
    }

    #[test]
    fn build_local_and_mock_evaluators() {
        let config = MasteryConfig::default();
        assert_eq!(build_evaluator(&config).unwrap().name(), "local");

        let mut config = MasteryConfig {
            evaluator: "demo".into(),
            ..Default::default()
        };
        config.providers.insert(
            "demo".into(),
            ProviderConfig::Mock {
                replies: vec![],
                default_reply: Some("Correct!".into()),
            },
        );
        assert_eq!(build_evaluator(&config).unwrap().name(), "mock");
    }

    #[test]
    fn unknown_evaluator_lists_choices() {
        let mut config = MasteryConfig {
            evaluator: "gpt".into(),
            ..Default::default()
        };
        config.providers.insert(
            "ollama".into(),
            ProviderConfig::Ollama {
                base_url: default_ollama_url(),
            },
        );
        let err = build_evaluator(&config).err().unwrap();
        let message = format!("{err:#}");
        assert!(message.contains("unknown evaluator 'gpt'"));
        assert!(message.contains("ollama"));
    }
}
