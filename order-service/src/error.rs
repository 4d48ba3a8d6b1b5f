use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("order not found")]
    OrderNotFound,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl From<saga_store::StoreError> for ApiError {
    fn from(err: saga_store::StoreError) -> Self {
        match err {
            saga_store::StoreError::OrderNotFound => ApiError::OrderNotFound,
            other => {
                tracing::error!("Store error: {}", other);
                ApiError::Database(other.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        ApiError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl actix_web::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::OrderNotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::OrderNotFound => "order not found".to_string(),
            ApiError::Validation(msg) => msg.clone(),
            // Infrastructure details stay out of client responses.
            ApiError::Database(_) | ApiError::Internal(_) => "internal server error".to_string(),
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn status_codes_match_error_classes() {
        assert_eq!(ApiError::OrderNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Validation("bad date".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Database("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = ApiError::Database("connection refused to 10.0.0.5".into());
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
