use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use segmint_core::errors::{ApplicationError, InterfaceError};

/// Uniform error envelope for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: message.into() }))
}

/// Maps an application failure onto the wire: 4xx responses keep the
/// descriptive message, 5xx responses log it under a correlation id and leak
/// only the user-safe text.
pub fn application_error(source: ApplicationError) -> ApiError {
    let correlation_id = Uuid::new_v4().to_string();
    let interface = source.into_interface(correlation_id.clone());

    match &interface {
        InterfaceError::BadRequest { message, .. } => {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %correlation_id,
                detail = %message,
                "request rejected"
            );
            error(StatusCode::BAD_REQUEST, message.clone())
        }
        InterfaceError::NotFound { message, .. } => {
            error(StatusCode::NOT_FOUND, message.clone())
        }
        InterfaceError::Unprocessable { message, .. } => {
            warn!(
                event_name = "api.request.unprocessable",
                correlation_id = %correlation_id,
                detail = %message,
                "request unprocessable"
            );
            error(StatusCode::UNPROCESSABLE_ENTITY, message.clone())
        }
        InterfaceError::ServiceUnavailable { message, .. } => {
            error!(
                event_name = "api.dependency.unavailable",
                correlation_id = %correlation_id,
                detail = %message,
                "dependency failure"
            );
            error(StatusCode::SERVICE_UNAVAILABLE, interface.user_message())
        }
        InterfaceError::Internal { message, .. } => {
            error!(
                event_name = "api.internal.error",
                correlation_id = %correlation_id,
                detail = %message,
                "internal error"
            );
            error(StatusCode::INTERNAL_SERVER_ERROR, interface.user_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use segmint_core::errors::{ApplicationError, DomainError, SegmentationError};

    use super::application_error;

    #[test]
    fn unsupported_algorithm_is_a_bad_request_with_detail() {
        let (status, body) = application_error(ApplicationError::from(DomainError::from(
            SegmentationError::UnsupportedAlgorithm("dbscan".to_string()),
        )));

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("dbscan"));
    }

    #[test]
    fn empty_cohort_is_unprocessable() {
        let (status, _) = application_error(ApplicationError::from(DomainError::from(
            SegmentationError::EmptyCohort,
        )));

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn persistence_failures_do_not_leak_detail() {
        let (status, body) =
            application_error(ApplicationError::Persistence("disk I/O error".to_string()));

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.error.contains("disk I/O error"));
    }
}
