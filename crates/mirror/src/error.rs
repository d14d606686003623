/// Failures writing the local session record.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The new value could not be encoded; the stored value is unchanged.
    #[error("failed to encode local store value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
