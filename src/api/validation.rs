use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One field/value record of an API error
pub type ErrorRecord = BTreeMap<String, Value>;

/// Error body shared by the sandbox service and the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Append a record built from field/value pairs
    pub fn with_record<const N: usize>(mut self, pairs: [(&str, Value); N]) -> Self {
        self.errors.push(
            pairs
                .into_iter()
                .map(|(field, value)| (field.to_string(), value))
                .collect(),
        );
        self
    }
}

fn bad_request(body: ErrorResponse) -> actix_web::Error {
    actix_web::error::InternalError::from_response("", HttpResponse::BadRequest().json(body)).into()
}

/// Creates a configured JsonConfig with standardized error handling for the entire service
pub fn json_config() -> actix_web_validator::JsonConfig {
    actix_web_validator::JsonConfig::default().error_handler(|err, _req| match err {
        actix_web_validator::Error::Validate(validation_errors) => {
            let mut body = ErrorResponse::new("Validation failed");
            for (field, errors) in validation_errors.field_errors() {
                for e in errors {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Validation error in field: {}", field));
                    body = body.with_record([
                        ("field", Value::from(field.to_string())),
                        ("error", Value::from(message)),
                    ]);
                }
            }
            // Nested structs report under their own key
            for (field, kind) in validation_errors.errors() {
                if let validator::ValidationErrorsKind::Struct(nested) = kind {
                    for (inner, errors) in nested.field_errors() {
                        for e in errors {
                            let message = e
                                .message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| format!("Validation error in field: {}", inner));
                            body = body.with_record([
                                ("field", Value::from(format!("{}.{}", field, inner))),
                                ("error", Value::from(message)),
                            ]);
                        }
                    }
                }
            }
            bad_request(body)
        }
        actix_web_validator::Error::Deserialize(de_err) => {
            let err_string = de_err.to_string();

            let message = if err_string.contains("EOF while parsing") {
                "Request body is empty. Expected JSON payload"
            } else if err_string.contains("unknown variant") {
                "Invalid enum value. Check allowed values for this field"
            } else {
                "Invalid JSON format"
            };

            bad_request(ErrorResponse::new("Request validation failed").with_record([
                ("field", Value::from("body")),
                ("error", Value::from(message)),
            ]))
        }
        _ => bad_request(ErrorResponse::new("Validation failed")),
    })
}
