use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::settings::store::StoreMap;

pub const KEY_API_KEY: &str = "apiKey";
pub const KEY_MODEL: &str = "model";
pub const KEY_IGNORED_URLS: &str = "ignoredUrls";
pub const KEY_CUSTOM_PROMPT: &str = "customPrompt";
pub const KEY_DOMAIN_SELECTORS: &str = "domainSelectors";

pub const SETTINGS_KEYS: [&str; 5] = [
    KEY_API_KEY,
    KEY_MODEL,
    KEY_IGNORED_URLS,
    KEY_CUSTOM_PROMPT,
    KEY_DOMAIN_SELECTORS,
];

pub type DomainSelectors = BTreeMap<String, Vec<SelectorRecord>>;

// ============================================================================
// Selector records
// ============================================================================

/// A manually registered element, persisted per domain.
///
/// Reads accept both the legacy bare-string shape and the object shape;
/// writes always produce the object shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredRecord", rename_all = "camelCase")]
pub struct SelectorRecord {
    pub selector: String,
    /// Page the element was picked on; empty for legacy records (any page of the domain)
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Legacy(String),
    Current {
        selector: String,
        #[serde(default)]
        url: String,
        #[serde(default, rename = "customPrompt")]
        custom_prompt: Option<String>,
    },
}

impl From<StoredRecord> for SelectorRecord {
    fn from(stored: StoredRecord) -> Self {
        match stored {
            StoredRecord::Legacy(selector) => SelectorRecord {
                selector,
                url: String::new(),
                custom_prompt: None,
            },
            StoredRecord::Current { selector, url, custom_prompt } => SelectorRecord {
                selector,
                url,
                custom_prompt: custom_prompt.filter(|p| !p.trim().is_empty()),
            },
        }
    }
}

impl SelectorRecord {
    pub fn new(selector: &str, url: &str) -> Self {
        SelectorRecord {
            selector: selector.to_string(),
            url: url.to_string(),
            custom_prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.custom_prompt = Some(prompt.to_string()).filter(|p| !p.trim().is_empty());
        self
    }

    /// Composite dedup key: two records clash when both selector and url match.
    pub fn same_target(&self, other: &SelectorRecord) -> bool {
        self.selector == other.selector && self.url == other.url
    }

    pub fn applies_to(&self, page_url: &str) -> bool {
        self.url.is_empty() || self.url == page_url
    }
}

// ============================================================================
// Settings snapshot
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    /// Newline-separated list of page URLs where no controls are injected
    pub ignored_urls: String,
    pub custom_prompt: String,
    pub domain_selectors: DomainSelectors,
}

impl Settings {
    /// Build a snapshot from raw store values. A malformed field falls back
    /// to its default instead of failing the whole read.
    pub fn from_values(values: &StoreMap) -> Settings {
        Settings {
            api_key: string_field(values, KEY_API_KEY),
            model: string_field(values, KEY_MODEL),
            ignored_urls: string_field(values, KEY_IGNORED_URLS),
            custom_prompt: string_field(values, KEY_CUSTOM_PROMPT),
            domain_selectors: domain_selectors_field(values),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.model.trim().is_empty()
    }

    /// Same rule the settings form enforces on save.
    pub fn validate(&self) -> Result<(), String> {
        if !self.has_credentials() {
            return Err("API Key and Model are required".to_string());
        }
        Ok(())
    }

    pub fn ignored_url_list(&self) -> Vec<&str> {
        self.ignored_urls
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }

    pub fn is_ignored(&self, page_url: &str) -> bool {
        self.ignored_url_list().contains(&page_url)
    }

    pub fn selectors_for(&self, domain: &str) -> &[SelectorRecord] {
        self.domain_selectors
            .get(domain)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Records of `domain` that apply to `page_url`, in registration order.
    pub fn selectors_for_page<'a>(
        &'a self,
        domain: &str,
        page_url: &'a str,
    ) -> impl Iterator<Item = &'a SelectorRecord> + 'a {
        self.selectors_for(domain)
            .iter()
            .filter(move |r| r.applies_to(page_url))
    }

    /// Prompt sent for an element: element prompt, else global prompt, then the text.
    pub fn compose_prompt(&self, element_prompt: Option<&str>, text: &str) -> String {
        let instruction = element_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(self.custom_prompt.as_str())
            .trim();

        if instruction.is_empty() {
            text.to_string()
        } else {
            format!("{}\n\n{}", instruction, text)
        }
    }
}

fn string_field(values: &StoreMap, key: &str) -> String {
    match values.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            warn!(key, value = %other, "ignoring non-string setting");
            String::new()
        }
    }
}

fn domain_selectors_field(values: &StoreMap) -> DomainSelectors {
    let Some(Value::Object(domains)) = values.get(KEY_DOMAIN_SELECTORS) else {
        return DomainSelectors::new();
    };

    let mut out = DomainSelectors::new();
    for (domain, records) in domains {
        let Value::Array(items) = records else {
            warn!(domain = %domain, "ignoring non-list selector entry");
            continue;
        };
        let parsed: Vec<SelectorRecord> = items
            .iter()
            .filter_map(|item| match serde_json::from_value::<SelectorRecord>(item.clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(domain = %domain, error = %e, "skipping unreadable selector record");
                    None
                }
            })
            .collect();
        if !parsed.is_empty() {
            out.insert(domain.clone(), parsed);
        }
    }
    out
}
