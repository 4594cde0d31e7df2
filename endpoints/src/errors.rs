use crate::storage::StoreError;
use crate::types::{Color, Namespace};
use crate::validation::ValidationError;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

/// Failures of the endpoint operations. Every variant maps to one HTTP status.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid username or password")]
    Authorization,

    #[error("No endpoint named {name} in {namespace}")]
    NotFound { namespace: Namespace, name: String },

    #[error("Color on {name} in {namespace} is already {color}")]
    Conflict {
        namespace: Namespace,
        name: String,
        color: Color,
    },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorItem {
    pub domain: String,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    pub errors: Vec<ErrorItem>,
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Authorization => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error body reported to the caller of the operation named `domain`.
    /// Unclassified failures are logged here and hidden behind a generic message.
    pub fn to_body(&self, domain: &str) -> ErrorBody {
        let status = self.status();
        let single = |reason: &str| {
            vec![ErrorItem {
                domain: domain.to_string(),
                reason: reason.to_string(),
                message: self.to_string(),
            }]
        };

        let (message, errors) = match self {
            ServiceError::Validation(err) => (
                err.to_string(),
                err.violations
                    .iter()
                    .map(|v| ErrorItem {
                        domain: domain.to_string(),
                        reason: v.reason.to_string(),
                        message: v.message.clone(),
                    })
                    .collect(),
            ),
            ServiceError::Authorization => (self.to_string(), single("AuthorizationError")),
            ServiceError::NotFound { .. } => (self.to_string(), single("NotFoundError")),
            ServiceError::Conflict { .. } => (self.to_string(), single("ConflictError")),
            ServiceError::Store(err) => {
                tracing::error!(domain, "unhandled error: {err}");
                let message = "Internal server error".to_string();
                let errors = vec![ErrorItem {
                    domain: format!("Unhandled Error in {domain}"),
                    reason: "InternalError".into(),
                    message: message.clone(),
                }];
                (message, errors)
            }
        };

        ErrorBody {
            code: status.as_u16(),
            message,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::FieldViolation;

    #[test]
    fn test_status_mapping() {
        let ns = Namespace::for_environment(Some("prod"));
        let conflict = ServiceError::Conflict {
            namespace: ns.clone(),
            name: "svc".into(),
            color: Color::Blue,
        };
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            conflict.to_string(),
            "Color on svc in prod-deployments is already blue"
        );

        let not_found = ServiceError::NotFound {
            namespace: ns,
            name: "svc".into(),
        };
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(ServiceError::Authorization.status(), StatusCode::UNAUTHORIZED);

        let store = ServiceError::Store(StoreError::Io(std::io::Error::other("disk on fire")));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_bodies() {
        let body = ServiceError::Authorization.to_body("flipEndpoint");
        assert_eq!(
            body,
            ErrorBody {
                code: 401,
                message: "Invalid username or password".into(),
                errors: vec![ErrorItem {
                    domain: "flipEndpoint".into(),
                    reason: "AuthorizationError".into(),
                    message: "Invalid username or password".into(),
                }],
            }
        );

        let validation = ServiceError::Validation(ValidationError {
            violations: vec![
                FieldViolation {
                    field: "name".into(),
                    reason: "any.required",
                    message: "\"name\" is required".into(),
                },
                FieldViolation {
                    field: "color".into(),
                    reason: "any.allowOnly",
                    message: "\"color\" must be one of [blue, green]".into(),
                },
            ],
        });
        let body = validation.to_body("createEndpoint");
        assert_eq!(body.code, 400);
        assert_eq!(body.errors.len(), 2);
        assert_eq!(body.errors[1].reason, "any.allowOnly");

        // storage details never reach the caller
        let store = ServiceError::Store(StoreError::Io(std::io::Error::other("disk on fire")));
        let body = store.to_body("getEndpoints");
        assert_eq!(body.code, 500);
        assert_eq!(body.message, "Internal server error");
        assert_eq!(body.errors[0].domain, "Unhandled Error in getEndpoints");
        assert!(!serde_json::to_string(&body).unwrap().contains("disk on fire"));
    }
}
