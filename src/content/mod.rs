pub mod content_script;
pub mod messages;
pub mod notice;
