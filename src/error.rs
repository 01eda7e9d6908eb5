use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Filter parse error: {0}")]
    FilterParse(String),
    #[error("Field '{0}' cannot be modified")]
    ImmutableField(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Configuration(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub const SCIM_ERROR_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

impl AppError {
    /// HTTP status a SCIM endpoint would answer with.
    pub fn status(&self) -> u16 {
        match self {
            AppError::BadRequest(_) | AppError::FilterParse(_) | AppError::ImmutableField(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::Database(_)
            | AppError::Serialization(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => 500,
        }
    }

    /// RFC 7644 section 3.12 `scimType` keyword, when one applies.
    pub fn scim_type(&self) -> Option<&'static str> {
        match self {
            AppError::FilterParse(_) => Some("invalidFilter"),
            AppError::ImmutableField(_) => Some("mutability"),
            AppError::BadRequest(_) => Some("invalidValue"),
            AppError::Conflict(_) => Some("uniqueness"),
            _ => None,
        }
    }

    /// SCIM 2.0 standard error body
    pub fn to_scim_error(&self) -> Value {
        let mut body = json!({
            "schemas": [SCIM_ERROR_SCHEMA],
            "detail": self.to_string(),
            "status": self.status().to_string(),
        });
        if let Some(scim_type) = self.scim_type() {
            body["scimType"] = json!(scim_type);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_errors_render_as_invalid_filter() {
        let body = AppError::FilterParse("unexpected token".to_string()).to_scim_error();
        assert_eq!(body["status"], "400");
        assert_eq!(body["scimType"], "invalidFilter");
        assert_eq!(body["schemas"][0], SCIM_ERROR_SCHEMA);
    }

    #[test]
    fn test_internal_errors_have_no_scim_type() {
        let body = AppError::Internal("boom".to_string()).to_scim_error();
        assert_eq!(body["status"], "500");
        assert!(body.get("scimType").is_none());
    }
}
