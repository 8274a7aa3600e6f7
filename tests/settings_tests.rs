use std::cell::RefCell;
use std::rc::Rc;

use page_assist::settings::{
    cache::SettingsCache,
    domain_selectors::{
        add_selector, clear_domain, delete_selector, load_domain_selectors, normalize_records, prune_selectors,
    },
    error::StoreError,
    settings_model::{KEY_DOMAIN_SELECTORS, SelectorRecord, Settings},
    store::{FileStore, MemoryStore, SettingsStore, StorageChange},
};
use serde_json::{Value, json};

mod common;

use crate::common::utils::{DOMAIN, PAGE_URL, store_with, values};

// =========================================================================
// Settings snapshot
// =========================================================================

#[test]
fn missing_and_malformed_fields_fall_back_to_defaults() {
    let settings = Settings::from_values(&values(json!({
        "apiKey": "sk-1",
        "model": 42,
        "customPrompt": null,
        "domainSelectors": { "a.com": "not a list", "b.com": [{ "url": "x" }, "#ok"] }
    })));

    assert_eq!(settings.api_key, "sk-1");
    assert_eq!(settings.model, "");
    assert_eq!(settings.custom_prompt, "");
    assert!(settings.selectors_for("a.com").is_empty());
    assert_eq!(settings.selectors_for("b.com"), &[SelectorRecord::new("#ok", "")]);
}

#[test]
fn validation_requires_key_and_model() {
    let mut settings = Settings::default();
    assert_eq!(settings.validate(), Err("API Key and Model are required".to_string()));

    settings.api_key = "sk-1".into();
    settings.model = "   ".into();
    assert!(!settings.has_credentials());
    assert!(settings.validate().is_err());

    settings.model = "gpt-4o-mini".into();
    assert_eq!(settings.validate(), Ok(()));
}

#[test]
fn ignored_urls_are_exact_matches_one_per_line() {
    let settings = Settings {
        ignored_urls: "https://example.com/private\n\n  https://docs.example.com/  \n".into(),
        ..Default::default()
    };

    assert_eq!(settings.ignored_url_list(), vec!["https://example.com/private", "https://docs.example.com/"]);
    assert!(settings.is_ignored("https://example.com/private"));
    assert!(settings.is_ignored("https://docs.example.com/"));
    assert!(!settings.is_ignored("https://example.com/private/sub"));
    assert!(!settings.is_ignored("https://example.com/"));
}

#[test]
fn element_prompt_overrides_global_prompt() {
    let settings = Settings {
        custom_prompt: "Fix grammar.".into(),
        ..Default::default()
    };

    assert_eq!(settings.compose_prompt(None, "hello wrld"), "Fix grammar.\n\nhello wrld");
    assert_eq!(
        settings.compose_prompt(Some("Translate to French."), "hello"),
        "Translate to French.\n\nhello"
    );
    assert_eq!(settings.compose_prompt(Some("  "), "hello"), "Fix grammar.\n\nhello");
    assert_eq!(Settings::default().compose_prompt(None, "as is"), "as is");
}

#[test]
fn page_selection_keeps_legacy_records_on_every_page() {
    let settings = Settings::from_values(&values(json!({
        "domainSelectors": {
            (DOMAIN): [
                "#legacy",
                { "selector": "#here", "url": PAGE_URL },
                { "selector": "#elsewhere", "url": "https://example.com/other" }
            ]
        }
    })));

    let selectors: Vec<&str> = settings
        .selectors_for_page(DOMAIN, PAGE_URL)
        .map(|r| r.selector.as_str())
        .collect();
    assert_eq!(selectors, vec!["#legacy", "#here"]);
}

// =========================================================================
// Selector records
// =========================================================================

#[test]
fn legacy_string_record_reads_as_object_and_writes_as_object() {
    let record: SelectorRecord = serde_json::from_value(json!("textarea[name=\"q\"]")).unwrap();
    assert_eq!(record, SelectorRecord::new("textarea[name=\"q\"]", ""));

    let written = serde_json::to_value(&record).unwrap();
    assert_eq!(written, json!({ "selector": "textarea[name=\"q\"]", "url": "" }));
}

#[test]
fn current_record_keeps_prompt_and_drops_blank_prompt() {
    let with_prompt: SelectorRecord =
        serde_json::from_value(json!({ "selector": "#a", "url": "u", "customPrompt": "Be brief" })).unwrap();
    assert_eq!(with_prompt.custom_prompt.as_deref(), Some("Be brief"));
    assert_eq!(serde_json::to_value(&with_prompt).unwrap()["customPrompt"], json!("Be brief"));

    let blank: SelectorRecord =
        serde_json::from_value(json!({ "selector": "#a", "url": "u", "customPrompt": " " })).unwrap();
    assert_eq!(blank.custom_prompt, None);
}

#[test]
fn dedup_is_on_selector_and_url_together() {
    let store = MemoryStore::new();
    assert!(add_selector(&store, DOMAIN, SelectorRecord::new("#foo", PAGE_URL)).unwrap());
    assert!(!add_selector(&store, DOMAIN, SelectorRecord::new("#foo", PAGE_URL)).unwrap());
    assert!(add_selector(&store, DOMAIN, SelectorRecord::new("#foo", "https://example.com/other")).unwrap());

    assert_eq!(load_domain_selectors(&store).unwrap()[DOMAIN].len(), 2);
}

#[test]
fn deleting_last_record_removes_the_domain_key() {
    let store = MemoryStore::new();
    add_selector(&store, DOMAIN, SelectorRecord::new("#a", PAGE_URL)).unwrap();
    add_selector(&store, DOMAIN, SelectorRecord::new("#b", PAGE_URL)).unwrap();
    add_selector(&store, "other.org", SelectorRecord::new("#c", "")).unwrap();

    let removed = delete_selector(&store, DOMAIN, 0).unwrap();
    assert_eq!(removed.map(|r| r.selector), Some("#a".to_string()));
    assert_eq!(load_domain_selectors(&store).unwrap()[DOMAIN], vec![SelectorRecord::new("#b", PAGE_URL)]);

    delete_selector(&store, DOMAIN, 0).unwrap();
    let raw = store.snapshot();
    let domains = raw[KEY_DOMAIN_SELECTORS].as_object().unwrap();
    assert!(!domains.contains_key(DOMAIN));
    assert!(domains.contains_key("other.org"));
}

#[test]
fn out_of_range_delete_changes_nothing() {
    let store = MemoryStore::new();
    add_selector(&store, DOMAIN, SelectorRecord::new("#a", PAGE_URL)).unwrap();

    assert_eq!(delete_selector(&store, DOMAIN, 3).unwrap(), None);
    assert_eq!(delete_selector(&store, "nope.com", 0).unwrap(), None);
    assert_eq!(load_domain_selectors(&store).unwrap()[DOMAIN].len(), 1);
}

#[test]
fn clear_and_prune() {
    let store = MemoryStore::new();
    for selector in ["#a", "#b", "#c"] {
        add_selector(&store, DOMAIN, SelectorRecord::new(selector, PAGE_URL)).unwrap();
    }

    let pruned = prune_selectors(&store, DOMAIN, &[SelectorRecord::new("#b", PAGE_URL)]).unwrap();
    assert_eq!(pruned, 1);
    let left: Vec<String> = load_domain_selectors(&store).unwrap()[DOMAIN]
        .iter()
        .map(|r| r.selector.clone())
        .collect();
    assert_eq!(left, vec!["#a", "#c"]);

    assert_eq!(clear_domain(&store, DOMAIN).unwrap(), 2);
    assert_eq!(clear_domain(&store, DOMAIN).unwrap(), 0);
    assert!(load_domain_selectors(&store).unwrap().is_empty());
}

#[test]
fn normalize_rewrites_only_when_legacy_records_exist() {
    let store = store_with(json!({ "domainSelectors": { (DOMAIN): ["#old", { "selector": "#new", "url": PAGE_URL }] } }));

    assert!(normalize_records(store.as_ref()).unwrap());
    let raw = store.snapshot();
    assert_eq!(raw[KEY_DOMAIN_SELECTORS][DOMAIN][0], json!({ "selector": "#old", "url": "" }));

    assert!(!normalize_records(store.as_ref()).unwrap());
}

// =========================================================================
// Stores and change notification
// =========================================================================

#[test]
fn subscribers_see_written_keys() {
    let store = MemoryStore::new();
    let seen: Rc<RefCell<Vec<StorageChange>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = store.subscribe(Box::new(move |change| sink.borrow_mut().push(change.clone())));

    store.set(values(json!({ "model": "m" }))).unwrap();
    store.remove(&["model", "absent"]).unwrap();
    store.remove(&["absent"]).unwrap();
    assert!(store.unsubscribe(id));
    store.set(values(json!({ "model": "m2" }))).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2, "removing nothing notifies nobody");
    assert_eq!(seen[0].keys, vec!["model"]);
    assert_eq!(seen[1].keys, vec!["model"]);
}

#[test]
fn file_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("settings.json");

    let first = FileStore::new(&path);
    assert!(first.get(&["apiKey"]).unwrap().is_empty(), "missing file reads as empty");
    first.set(values(json!({ "apiKey": "sk-file", "model": "m" }))).unwrap();

    let second = FileStore::new(&path);
    let read = second.get(&["apiKey", "model", "customPrompt"]).unwrap();
    assert_eq!(read.get("apiKey"), Some(&Value::String("sk-file".into())));
    assert!(!read.contains_key("customPrompt"));
}

#[test]
fn file_store_rejects_non_object_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    std::fs::write(&path, "[1, 2]").unwrap();
    assert!(matches!(FileStore::new(&path).get(&["apiKey"]), Err(StoreError::Malformed(_))));

    std::fs::write(&path, "{ nope").unwrap();
    assert!(matches!(FileStore::new(&path).get(&["apiKey"]), Err(StoreError::Json { .. })));
}

// =========================================================================
// Settings cache
// =========================================================================

#[test]
fn cache_serves_repeated_reads_from_memory() {
    let store = store_with(json!({ "apiKey": "sk-1", "model": "m" }));
    let cache = SettingsCache::new(store.clone());

    let a = cache.get().unwrap();
    let b = cache.get().unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(cache.fetch_count(), 1);
}

#[test]
fn cache_refetches_after_any_write() {
    let store = store_with(json!({ "apiKey": "sk-1", "model": "m" }));
    let cache = SettingsCache::new(store.clone());
    assert_eq!(cache.get().unwrap().model, "m");

    store.set(values(json!({ "model": "m2" }))).unwrap();
    assert!(!cache.is_warm());
    assert_eq!(cache.get().unwrap().model, "m2");
    assert_eq!(cache.fetch_count(), 2);
}

#[test]
fn dropping_the_cache_unsubscribes() {
    let store = Rc::new(MemoryStore::new());
    let cache = SettingsCache::new(store.clone());
    cache.get().unwrap();
    drop(cache);

    // A fresh subscription reuses nothing from the dropped cache; writes still succeed
    store.set(values(json!({ "model": "m" }))).unwrap();
    let replacement = SettingsCache::new(store.clone());
    assert_eq!(replacement.get().unwrap().model, "m");
}
