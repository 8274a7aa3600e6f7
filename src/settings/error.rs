use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing file could not be read or written
    #[error("settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Stored JSON could not be parsed or produced
    #[error("settings JSON ({context}): {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored document is valid JSON but not an object of settings
    #[error("settings store is malformed: {0}")]
    Malformed(String),
}
