use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required fields: {0}")]
    MissingFields(String),

    #[error("Invalid API credentials: {0}")]
    InvalidCredentials(String),

    #[error("This exchange account is already linked to another user")]
    DuplicateAccount,

    #[error("Exchange account not connected")]
    AccountNotConnected,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Exchange unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Exchange rejected request ({code}): {message}")]
    UpstreamRejected { code: i64, message: String },

    #[error("Unexpected exchange response: {0}")]
    UpstreamDataInvalid(String),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Failures caused by the exchange rather than by this service or the caller.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::UpstreamUnavailable(_)
                | Error::UpstreamRejected { .. }
                | Error::UpstreamDataInvalid(_)
        )
    }

    /// Failures that point at process configuration (vault key, env) rather than the request.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            Error::EncryptionError(_) | Error::DecryptionError(_) | Error::ConfigError(_)
        )
    }

    /// Stable machine-readable code used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingFields(_) => "MISSING_FIELDS",
            Error::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            Error::DuplicateAccount => "DUPLICATE_ACCOUNT",
            Error::AccountNotConnected => "ACCOUNT_NOT_CONNECTED",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::EncryptionError(_) => "ENCRYPTION_ERROR",
            Error::DecryptionError(_) => "DECRYPTION_ERROR",
            Error::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Error::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
            Error::UpstreamDataInvalid(_) => "UPSTREAM_DATA_INVALID",
            Error::DbError(_) => "DATABASE_ERROR",
            Error::ConfigError(_) => "CONFIG_ERROR",
            Error::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::UpstreamUnavailable(format!("request timed out: {}", err))
        } else {
            Error::UpstreamUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_classification() {
        assert!(Error::UpstreamUnavailable("down".into()).is_upstream());
        assert!(Error::UpstreamRejected {
            code: 10003,
            message: "API key is invalid.".into()
        }
        .is_upstream());
        assert!(Error::UpstreamDataInvalid("missing execId".into()).is_upstream());
        assert!(!Error::AccountNotConnected.is_upstream());
        assert!(!Error::DecryptionError("tag mismatch".into()).is_upstream());
    }

    #[test]
    fn vault_errors_are_misconfiguration() {
        assert!(Error::DecryptionError("bad key".into()).is_misconfiguration());
        assert!(Error::EncryptionError("no key".into()).is_misconfiguration());
        assert!(!Error::MissingFields("apiKey".into()).is_misconfiguration());
    }

    #[test]
    fn rejected_message_includes_code() {
        let err = Error::UpstreamRejected {
            code: 10002,
            message: "invalid request, please check your server timestamp".into(),
        };
        assert!(err.to_string().contains("10002"));
        assert_eq!(err.code(), "UPSTREAM_REJECTED");
    }
}
