pub mod selector_engine;
