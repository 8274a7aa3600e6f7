use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::completion::api::DEFAULT_ENDPOINT;
use crate::completion::client::ClientOptions;
use crate::content::content_script::ContentConfig;
use crate::overlay::overlay_manager::DEFAULT_REPOSITION_DELAY_MS;
use crate::trace::logger::TraceLogger;
use crate::watcher::mutation_watcher::DEFAULT_RECONCILE_DELAY_MS;

pub const DEFAULT_CONFIG_PATH: &str = "page-assist.yaml";
pub const DEFAULT_STORE_PATH: &str = "page-assist-settings.json";
pub const API_KEY_ENV: &str = "PAGE_ASSIST_API_KEY";

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "page-assist",
    version,
    about = "Inline AI completions for page text fields"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: page-assist.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Settings store file
    #[arg(long, global = true)]
    pub store: Option<String>,

    /// Chat completions endpoint
    #[arg(long, global = true)]
    pub endpoint: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream a completion for a prompt using the stored settings
    Complete {
        /// Text sent as the element content
        #[arg(long)]
        prompt: String,

        /// Instruction used instead of the global custom prompt
        #[arg(long)]
        element_prompt: Option<String>,
    },

    /// Show or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Manage per-domain selectors
    Selectors {
        #[command(subcommand)]
        action: SelectorsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    Show,
    /// Update settings; API key and model must both be set afterwards
    Set {
        #[arg(long)]
        api_key: Option<String>,

        #[arg(long)]
        model: Option<String>,

        /// Newline-separated page URLs to leave alone
        #[arg(long)]
        ignored_urls: Option<String>,

        #[arg(long)]
        custom_prompt: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SelectorsAction {
    List {
        #[arg(long)]
        domain: Option<String>,
    },
    Add {
        #[arg(long)]
        domain: String,

        #[arg(long)]
        selector: String,

        /// Page URL the selector was registered on (empty: any page of the domain)
        #[arg(long, default_value = "")]
        url: String,

        #[arg(long)]
        prompt: Option<String>,
    },
    Delete {
        #[arg(long)]
        domain: String,

        /// Position as shown by `selectors list`
        #[arg(long)]
        index: usize,
    },
    Clear {
        #[arg(long)]
        domain: String,
    },
    /// Rewrite legacy string records in the current object shape
    Normalize,
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `page-assist.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub completion: CompletionConfig,
    /// `timings`, `selectors` and `trace` are consumed by embedding hosts
    #[serde(default)]
    pub timings: TimingConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub endpoint: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Unset: no whole-request limit
    pub request_timeout_secs: Option<u64>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_reposition_delay")]
    pub reposition_delay_ms: u64,

    #[serde(default = "default_reconcile_delay")]
    pub reconcile_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reposition_delay_ms: default_reposition_delay(),
            reconcile_delay_ms: default_reconcile_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_true")]
    pub prune_stale: bool,

    #[serde(default = "default_stale_passes")]
    pub stale_after_passes: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            prune_stale: true,
            stale_after_passes: default_stale_passes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    /// JSONL session trace; unset disables tracing
    pub path: Option<String>,
}

// Serde default helpers
fn default_connect_timeout() -> u64 { 10 }
fn default_reposition_delay() -> u64 { DEFAULT_REPOSITION_DELAY_MS }
fn default_reconcile_delay() -> u64 { DEFAULT_RECONCILE_DELAY_MS }
fn default_true() -> bool { true }
fn default_stale_passes() -> u32 { 5 }
fn default_store_path() -> String { DEFAULT_STORE_PATH.to_string() }

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_default(),
        Err(_) => AppConfig::default(),
    }
}

// ============================================================================
// Config Builders (merge CLI args with config file)
// ============================================================================

/// Endpoint: CLI > config > default.
pub fn build_client_options(cli_endpoint: Option<&str>, config: &AppConfig) -> ClientOptions {
    let endpoint = cli_endpoint
        .or(config.completion.endpoint.as_deref())
        .unwrap_or(DEFAULT_ENDPOINT);
    ClientOptions {
        endpoint: endpoint.to_string(),
        connect_timeout: Duration::from_secs(config.completion.connect_timeout_secs),
        request_timeout: config.completion.request_timeout_secs.map(Duration::from_secs),
    }
}

/// Page-side settings for hosts embedding `ContentScript`; the binary itself
/// only reads the `completion` and `store` sections.
pub fn build_content_config(config: &AppConfig) -> ContentConfig {
    ContentConfig {
        reposition_delay_ms: config.timings.reposition_delay_ms,
        reconcile_delay_ms: config.timings.reconcile_delay_ms,
        prune_stale_selectors: config.selectors.prune_stale,
        stale_after_passes: config.selectors.stale_after_passes,
    }
}

/// Store file: CLI > config > default.
pub fn resolve_store_path(cli_store: Option<&str>, config: &AppConfig) -> String {
    cli_store.unwrap_or(&config.store.path).to_string()
}

/// API key: stored setting, else the environment.
pub fn resolve_api_key(stored: &str) -> String {
    if !stored.trim().is_empty() {
        return stored.to_string();
    }
    std::env::var(API_KEY_ENV).unwrap_or_default()
}

/// Session trace for hosts embedding `ContentScript`.
pub fn build_tracer(config: &AppConfig) -> TraceLogger {
    match &config.trace.path {
        Some(path) => TraceLogger::new(path),
        None => TraceLogger::disabled(),
    }
}
