use thiserror::Error;

use crate::completion::error::CompletionError;
use crate::settings::error::StoreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Settings would be saved in a state the page cannot use
    #[error("{0}")]
    Invalid(String),

    #[error("no selector at index {index} for {domain}")]
    NoSuchSelector { domain: String, index: usize },

    #[error("could not write output: {0}")]
    Output(#[from] std::io::Error),
}
