use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown animation: {name}")]
    UnknownAnimation { name: String },

    #[error("unknown skin: {name}")]
    UnknownSkin { name: String },

    #[error("unknown slot: {name}")]
    UnknownSlot { name: String },

    #[error("unknown attachment '{attachment}' for slot '{slot}'")]
    UnknownAttachment { slot: String, attachment: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("failed to parse atlas: {message}")]
    AtlasParse { message: String },
}
