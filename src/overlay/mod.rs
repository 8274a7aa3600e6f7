pub mod overlay_manager;
pub mod registry;
