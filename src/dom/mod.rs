pub mod dom_model;
pub mod error;
pub mod query;
pub mod text_carrier;
