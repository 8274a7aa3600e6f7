use serde_json::Value;
use tracing::debug;

use crate::settings::error::StoreError;
use crate::settings::settings_model::{
    DomainSelectors, KEY_DOMAIN_SELECTORS, SelectorRecord, Settings,
};
use crate::settings::store::{SettingsStore, StoreMap};

// Read-modify-write over the whole `domainSelectors` map. Writers in other
// contexts are not coordinated: the last write wins.

pub fn load_domain_selectors(store: &dyn SettingsStore) -> Result<DomainSelectors, StoreError> {
    let values = store.get(&[KEY_DOMAIN_SELECTORS])?;
    Ok(Settings::from_values(&values).domain_selectors)
}

/// Persist the map in the current record shape, dropping domains with no records.
pub fn save_domain_selectors(store: &dyn SettingsStore, mut map: DomainSelectors) -> Result<(), StoreError> {
    map.retain(|_, records| !records.is_empty());
    let value = serde_json::to_value(&map).map_err(|e| StoreError::Json {
        context: "serialize domain selectors".into(),
        source: e,
    })?;
    let mut items = StoreMap::new();
    items.insert(KEY_DOMAIN_SELECTORS.to_string(), value);
    store.set(items)
}

/// Append a record; returns false when an equal (selector, url) entry already exists.
pub fn add_selector(store: &dyn SettingsStore, domain: &str, record: SelectorRecord) -> Result<bool, StoreError> {
    let mut map = load_domain_selectors(store)?;
    let records = map.entry(domain.to_string()).or_default();
    if records.iter().any(|r| r.same_target(&record)) {
        debug!(domain, selector = %record.selector, "selector already registered");
        return Ok(false);
    }
    records.push(record);
    save_domain_selectors(store, map)?;
    Ok(true)
}

/// Remove the entry at `index`, keeping the order of the rest.
pub fn delete_selector(
    store: &dyn SettingsStore,
    domain: &str,
    index: usize,
) -> Result<Option<SelectorRecord>, StoreError> {
    let mut map = load_domain_selectors(store)?;
    let Some(records) = map.get_mut(domain) else {
        return Ok(None);
    };
    if index >= records.len() {
        return Ok(None);
    }
    let removed = records.remove(index);
    save_domain_selectors(store, map)?;
    Ok(Some(removed))
}

/// Drop every record for `domain`; returns how many were removed.
pub fn clear_domain(store: &dyn SettingsStore, domain: &str) -> Result<usize, StoreError> {
    let mut map = load_domain_selectors(store)?;
    let Some(records) = map.remove(domain) else {
        return Ok(0);
    };
    save_domain_selectors(store, map)?;
    Ok(records.len())
}

/// Remove records of `domain` matching any of `stale` on (selector, url).
pub fn prune_selectors(
    store: &dyn SettingsStore,
    domain: &str,
    stale: &[SelectorRecord],
) -> Result<usize, StoreError> {
    if stale.is_empty() {
        return Ok(0);
    }
    let mut map = load_domain_selectors(store)?;
    let Some(records) = map.get_mut(domain) else {
        return Ok(0);
    };
    let before = records.len();
    records.retain(|r| !stale.iter().any(|s| s.same_target(r)));
    let pruned = before - records.len();
    if pruned > 0 {
        save_domain_selectors(store, map)?;
    }
    Ok(pruned)
}

/// Rewrite stored records in the current shape (legacy strings become objects).
pub fn normalize_records(store: &dyn SettingsStore) -> Result<bool, StoreError> {
    let raw = store.get(&[KEY_DOMAIN_SELECTORS])?;
    let has_legacy = match raw.get(KEY_DOMAIN_SELECTORS) {
        Some(Value::Object(domains)) => domains.values().any(|records| {
            records
                .as_array()
                .is_some_and(|items| items.iter().any(Value::is_string))
        }),
        _ => false,
    };
    if has_legacy {
        let map = load_domain_selectors(store)?;
        save_domain_selectors(store, map)?;
    }
    Ok(has_legacy)
}
