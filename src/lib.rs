pub mod cli;
pub mod completion;
pub mod content;
pub mod dom;
pub mod overlay;
pub mod render;
pub mod schedule;
pub mod selector;
pub mod selector_mode;
pub mod settings;
pub mod trace;
pub mod watcher;
