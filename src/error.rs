use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Reasons an auth collaborator can reject a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    UnknownAccount,
    TooManyRequests,
    EmailInUse,
    WeakPassword,
    Generic,
}

impl AuthFailure {
    /// User-facing message for the failure
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::InvalidCredentials => "Invalid email or password",
            AuthFailure::UnknownAccount => "No account is registered for this email",
            AuthFailure::TooManyRequests => {
                "Too many recent attempts. Wait a moment before trying again"
            }
            AuthFailure::EmailInUse => "This email is already registered",
            AuthFailure::WeakPassword => "Password is too weak",
            AuthFailure::Generic => "Authentication failed. Check your credentials",
        }
    }

    /// Maps a Firebase Identity Toolkit error code onto a failure kind
    pub fn from_code(code: &str) -> Self {
        // Identity Toolkit appends details after " : ", e.g. "WEAK_PASSWORD : ..."
        let code = code.split(':').next().unwrap_or_default().trim();
        match code {
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
                AuthFailure::InvalidCredentials
            }
            "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => AuthFailure::UnknownAccount,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthFailure::TooManyRequests,
            "EMAIL_EXISTS" => AuthFailure::EmailInUse,
            "WEAK_PASSWORD" => AuthFailure::WeakPassword,
            _ => AuthFailure::Generic,
        }
    }
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid movie reference: {0}")]
    InvalidMovieReference(String),

    #[error("Sign-in required")]
    SignInRequired,

    #[error("{}", .0.message())]
    Auth(AuthFailure),

    #[error("Catalog API key is not configured")]
    MissingApiKey,

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for failures of a remote collaborator that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::HttpClient(_) | AppError::Store(_) | AppError::ExternalApi(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(_) | AppError::InvalidMovieReference(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::SignInRequired => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Auth(failure) => {
                let status = match failure {
                    AuthFailure::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
                    AuthFailure::EmailInUse => StatusCode::CONFLICT,
                    AuthFailure::WeakPassword => StatusCode::BAD_REQUEST,
                    _ => StatusCode::UNAUTHORIZED,
                };
                (status, failure.message().to_string())
            }
            AppError::MissingApiKey => (StatusCode::PRECONDITION_REQUIRED, self.to_string()),
            AppError::Cache(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::HttpClient(_) | AppError::Store(_) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
