use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: &'static str,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error",
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

/// Flattens `validator` derive errors into a single `AppError::Validation`
/// message so every endpoint shares one error path.
pub trait ValidateExt {
    fn validate_app(&self) -> Result<(), AppError>;
}

impl<T: validator::Validate> ValidateExt for T {
    fn validate_app(&self) -> Result<(), AppError> {
        self.validate().map_err(|errors| {
            let mut parts: Vec<String> = Vec::new();
            for (field, field_errors) in errors.field_errors() {
                for error in field_errors {
                    let message = error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into());
                    parts.push(format!("{}: {}", field, message));
                }
            }
            parts.sort();
            AppError::Validation(parts.join("; "))
        })
    }
}

/// Range check shared by self-assessments and manager ratings.
pub fn check_rating_range(rating: i64) -> Result<(), AppError> {
    if !(1..=10).contains(&rating) {
        return Err(AppError::Validation(format!(
            "Rating must be between 1 and 10, got {}",
            rating
        )));
    }
    Ok(())
}

/// Answers reference one of the four question options.
pub fn check_answer_range(answer: i64) -> Result<(), AppError> {
    if !(1..=4).contains(&answer) {
        return Err(AppError::Validation(format!(
            "Answer must reference an option between 1 and 4, got {}",
            answer
        )));
    }
    Ok(())
}
