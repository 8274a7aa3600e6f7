use std::io::Write;

use serde_json::Value;
use tracing::{debug, info};

use crate::cli::config::resolve_api_key;
use crate::cli::error::CliError;
use crate::completion::client::CompletionBackend;
use crate::settings::domain_selectors::{
    add_selector, clear_domain, delete_selector, load_domain_selectors, normalize_records,
};
use crate::settings::settings_model::{
    KEY_API_KEY, KEY_CUSTOM_PROMPT, KEY_IGNORED_URLS, KEY_MODEL, SETTINGS_KEYS, SelectorRecord, Settings,
};
use crate::settings::store::{SettingsStore, StoreMap};

// ============================================================================
// complete subcommand
// ============================================================================

/// Stream a completion to `out` as fragments arrive. Returns the full reply.
pub fn cmd_complete(
    store: &dyn SettingsStore,
    backend: &dyn CompletionBackend,
    prompt: &str,
    element_prompt: Option<&str>,
    out: &mut dyn Write,
) -> Result<String, CliError> {
    let settings = read_settings(store)?;
    let api_key = resolve_api_key(&settings.api_key);
    let full_prompt = settings.compose_prompt(element_prompt, prompt);

    let mut reply = String::new();
    for fragment in backend.stream_completion(&api_key, &settings.model, &full_prompt)? {
        let fragment = fragment?;
        out.write_all(fragment.as_bytes())?;
        out.flush()?;
        reply.push_str(&fragment);
    }
    writeln!(out)?;

    info!(reply_chars = reply.chars().count(), "completion finished");
    Ok(reply)
}

// ============================================================================
// settings subcommand
// ============================================================================

pub fn cmd_settings_show(store: &dyn SettingsStore, out: &mut dyn Write) -> Result<(), CliError> {
    let settings = read_settings(store)?;

    writeln!(out, "API key:       {}", mask_secret(&settings.api_key))?;
    writeln!(out, "Model:         {}", display_or_unset(&settings.model))?;
    writeln!(out, "Custom prompt: {}", display_or_unset(&settings.custom_prompt))?;

    let ignored = settings.ignored_url_list();
    writeln!(out, "Ignored URLs:  {}", ignored.len())?;
    for url in ignored {
        writeln!(out, "  - {}", url)?;
    }

    let records: usize = settings.domain_selectors.values().map(Vec::len).sum();
    writeln!(
        out,
        "Selectors:     {} across {} domains",
        records,
        settings.domain_selectors.len()
    )?;
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct SettingsUpdate {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub ignored_urls: Option<String>,
    pub custom_prompt: Option<String>,
}

/// Apply `update` on top of the stored settings. Refused, with nothing
/// written, when the result would lack an API key or model.
pub fn cmd_settings_set(store: &dyn SettingsStore, update: SettingsUpdate) -> Result<Settings, CliError> {
    let mut settings = read_settings(store)?;
    if let Some(v) = update.api_key {
        settings.api_key = v.trim().to_string();
    }
    if let Some(v) = update.model {
        settings.model = v.trim().to_string();
    }
    if let Some(v) = update.ignored_urls {
        settings.ignored_urls = v;
    }
    if let Some(v) = update.custom_prompt {
        settings.custom_prompt = v;
    }
    settings.validate().map_err(CliError::Invalid)?;

    let mut items = StoreMap::new();
    items.insert(KEY_API_KEY.into(), Value::String(settings.api_key.clone()));
    items.insert(KEY_MODEL.into(), Value::String(settings.model.clone()));
    items.insert(KEY_IGNORED_URLS.into(), Value::String(settings.ignored_urls.clone()));
    items.insert(KEY_CUSTOM_PROMPT.into(), Value::String(settings.custom_prompt.clone()));
    store.set(items)?;

    info!(model = %settings.model, "settings saved");
    Ok(settings)
}

// ============================================================================
// selectors subcommand
// ============================================================================

pub fn cmd_selectors_list(
    store: &dyn SettingsStore,
    domain: Option<&str>,
    out: &mut dyn Write,
) -> Result<usize, CliError> {
    let map = load_domain_selectors(store)?;
    let mut shown = 0;

    for (name, records) in map.iter().filter(|(name, _)| domain.is_none_or(|d| d == name.as_str())) {
        writeln!(out, "{}", name)?;
        for (i, record) in records.iter().enumerate() {
            writeln!(out, "  [{}] {}", i, describe_record(record))?;
            shown += 1;
        }
    }

    if shown == 0 {
        writeln!(out, "No selectors registered")?;
    }
    Ok(shown)
}

pub fn cmd_selectors_add(
    store: &dyn SettingsStore,
    domain: &str,
    selector: &str,
    url: &str,
    prompt: Option<&str>,
) -> Result<bool, CliError> {
    let mut record = SelectorRecord::new(selector, url);
    if let Some(p) = prompt {
        record = record.with_prompt(p);
    }
    let added = add_selector(store, domain, record)?;
    debug!(domain, selector, added, "add selector");
    Ok(added)
}

pub fn cmd_selectors_delete(
    store: &dyn SettingsStore,
    domain: &str,
    index: usize,
) -> Result<SelectorRecord, CliError> {
    delete_selector(store, domain, index)?.ok_or_else(|| CliError::NoSuchSelector {
        domain: domain.to_string(),
        index,
    })
}

pub fn cmd_selectors_clear(store: &dyn SettingsStore, domain: &str) -> Result<usize, CliError> {
    Ok(clear_domain(store, domain)?)
}

pub fn cmd_selectors_normalize(store: &dyn SettingsStore) -> Result<bool, CliError> {
    Ok(normalize_records(store)?)
}

// ============================================================================
// Helpers
// ============================================================================

fn read_settings(store: &dyn SettingsStore) -> Result<Settings, CliError> {
    let values = store.get(&SETTINGS_KEYS)?;
    Ok(Settings::from_values(&values))
}

/// First four characters, the rest starred.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "(unset)".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

fn display_or_unset(value: &str) -> &str {
    if value.trim().is_empty() { "(unset)" } else { value }
}

fn describe_record(record: &SelectorRecord) -> String {
    let url = if record.url.is_empty() { "any page" } else { record.url.as_str() };
    match &record.custom_prompt {
        Some(p) => format!("{}  ({})  prompt: {}", record.selector, url, p),
        None => format!("{}  ({})", record.selector, url),
    }
}
