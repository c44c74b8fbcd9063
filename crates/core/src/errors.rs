use thiserror::Error;

/// Failures raised by the segmentation pipeline itself. Each run either
/// completes or fails with one of these; there are no partial results.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("unsupported segmentation algorithm `{0}` (expected rfm|kmeans)")]
    UnsupportedAlgorithm(String),
    #[error("segmentation cohort is empty: no customers with completed purchases")]
    EmptyCohort,
    #[error("cluster normalization is degenerate: cohort maximum for {metric} is zero")]
    DegenerateCohort { metric: &'static str },
    #[error("cluster count must be at least 1, got {0}")]
    InvalidClusterCount(usize),
    #[error("metrics cannot be computed over an empty assignment list")]
    EmptyAssignments,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::Unprocessable { .. } => {
                "The request was valid but the current data cannot satisfy it."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::Segmentation(error)) => match error {
                SegmentationError::UnsupportedAlgorithm(_)
                | SegmentationError::InvalidClusterCount(_) => Self::BadRequest {
                    message: error.to_string(),
                    correlation_id: "unassigned".to_owned(),
                },
                SegmentationError::EmptyCohort
                | SegmentationError::DegenerateCohort { .. }
                | SegmentationError::EmptyAssignments => Self::Unprocessable {
                    message: error.to_string(),
                    correlation_id: "unassigned".to_owned(),
                },
            },
            ApplicationError::Domain(DomainError::InvariantViolation(message)) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError, SegmentationError};

    #[test]
    fn unsupported_algorithm_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::from(
            SegmentationError::UnsupportedAlgorithm("dbscan".to_owned()),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn empty_cohort_maps_to_unprocessable() {
        let interface = ApplicationError::from(DomainError::from(SegmentationError::EmptyCohort))
            .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Unprocessable { .. }));
        assert_eq!(
            interface.user_message(),
            "The request was valid but the current data cannot satisfy it."
        );
    }

    #[test]
    fn degenerate_cohort_maps_to_unprocessable() {
        let interface = ApplicationError::from(DomainError::from(
            SegmentationError::DegenerateCohort { metric: "total_spent" },
        ))
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Unprocessable { .. }));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("missing token secret".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
