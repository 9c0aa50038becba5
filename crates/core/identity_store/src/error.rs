#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("unique constraint violated: {what}")]
    AlreadyExists { what: String },

    #[error("no such device")]
    DeviceNotFound,

    #[error("no such group")]
    GroupNotFound,

    #[error("no such peer broker: {broker_id}")]
    PeerNotFound { broker_id: String },

    #[error("failed to open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
