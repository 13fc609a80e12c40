use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTableErrorCode {
    Io,
    Encode,
    Decode,
    InvalidConfig,
    SourceUnavailable,
    StoreUnavailable,
    PersistFailure,
    Expression,
}

impl PowerTableErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerTableErrorCode::Io => "io",
            PowerTableErrorCode::Encode => "encode",
            PowerTableErrorCode::Decode => "decode",
            PowerTableErrorCode::InvalidConfig => "invalid_config",
            PowerTableErrorCode::SourceUnavailable => "source_unavailable",
            PowerTableErrorCode::StoreUnavailable => "store_unavailable",
            PowerTableErrorCode::PersistFailure => "persist_failure",
            PowerTableErrorCode::Expression => "expression",
        }
    }
}

#[derive(Debug, Error)]
pub enum PowerTableError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("source '{entity_id}' unavailable: {message}")]
    SourceUnavailable { entity_id: String, message: String },
    #[error("store '{entity}' unavailable: {message}")]
    StoreUnavailable { entity: String, message: String },
    #[error("failed to persist store '{entity}': {message}")]
    PersistFailure { entity: String, message: String },
    #[error("unsupported expression '{expression}': {message}")]
    Expression { expression: String, message: String },
}

impl PowerTableError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        PowerTableError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn source_unavailable(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        PowerTableError::SourceUnavailable {
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> PowerTableErrorCode {
        match self {
            PowerTableError::Io(_) => PowerTableErrorCode::Io,
            PowerTableError::Encode(_) => PowerTableErrorCode::Encode,
            PowerTableError::Decode(_) => PowerTableErrorCode::Decode,
            PowerTableError::InvalidConfig { .. } => PowerTableErrorCode::InvalidConfig,
            PowerTableError::SourceUnavailable { .. } => PowerTableErrorCode::SourceUnavailable,
            PowerTableError::StoreUnavailable { .. } => PowerTableErrorCode::StoreUnavailable,
            PowerTableError::PersistFailure { .. } => PowerTableErrorCode::PersistFailure,
            PowerTableError::Expression { .. } => PowerTableErrorCode::Expression,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::{PowerTableError, PowerTableErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(PowerTableErrorCode::InvalidConfig.as_str(), "invalid_config");
        assert_eq!(
            PowerTableErrorCode::SourceUnavailable.as_str(),
            "source_unavailable"
        );
        assert_eq!(
            PowerTableErrorCode::PersistFailure.as_str(),
            "persist_failure"
        );
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = PowerTableError::source_unavailable("sensor.rooms", "entity not found");
        assert_eq!(err.code(), PowerTableErrorCode::SourceUnavailable);
        assert_eq!(err.code_str(), "source_unavailable");
        assert_eq!(
            err.to_string(),
            "source 'sensor.rooms' unavailable: entity not found"
        );
    }
}
