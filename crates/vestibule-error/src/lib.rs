use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Error taxonomy for the SSO coordinator.
///
/// Everything in the authentication path is recoverable: the request
/// boundary translates these into "needs login" / failed-login
/// responses instead of crashing. Only `Config` and `Unknown` indicate
/// a misbehaving deployment rather than a misbehaving request.
#[derive(Error, Debug)]
pub enum AppError {
    /// Credential verification rejected the login. No state was mutated.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// An operation referenced a session or SSO id absent from its store.
    /// Callers recover by treating the subject as unauthenticated.
    #[error("not found: {0}")]
    NotFound(String),

    /// Reauthentication was attempted against an unknown or already
    /// reaped SSO record. Callers must fall back to a full login.
    #[error("SSO record invalid: {0}")]
    SsoInvalid(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the request boundary can absorb this error by asking the
    /// client to log in again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::AuthenticationFailed | AppError::NotFound(_) | AppError::SsoInvalid(_)
        )
    }

    /// Stable code for programmatic handling and log correlation.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::SsoInvalid(_) => "SSO_INVALID",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }
}
