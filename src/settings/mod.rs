pub mod cache;
pub mod domain_selectors;
pub mod error;
pub mod settings_model;
pub mod store;
