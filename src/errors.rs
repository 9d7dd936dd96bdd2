use crate::submit::Rejection;
use axum::http::StatusCode;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        let status = match &rejection {
            Rejection::MissingRequiredField(_) => StatusCode::BAD_REQUEST,
            Rejection::DuplicateDetected => StatusCode::CONFLICT,
            Rejection::DuplicateCheckFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Rejection::RemoteInsertFailed(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, rejection.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
