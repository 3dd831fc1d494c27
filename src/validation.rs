use std::borrow::Cow;

use chrono::{DateTime, NaiveDate};
use validator::{ValidationError, ValidationErrors};

use crate::{error::FieldError, models::user::Role};

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// Self-registration may pick any role except `admin`.
pub fn validate_registration_role(role: &str) -> Result<(), ValidationError> {
    match role.parse::<Role>() {
        Ok(Role::Admin) | Err(_) => Err(invalid(
            "role",
            "must be one of: user, asisten, programmer",
        )),
        Ok(_) => Ok(()),
    }
}

pub fn validate_role(role: &str) -> Result<(), ValidationError> {
    role.parse::<Role>()
        .map(|_| ())
        .map_err(|_| invalid("role", "must be one of: user, asisten, programmer, admin"))
}

pub fn validate_birth_date(value: &str) -> Result<(), ValidationError> {
    parse_birth_date(value)
        .map(|_| ())
        .ok_or_else(|| invalid("date", "must be a valid date"))
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_birth_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|d| d.date_naive()))
}

/// Wire (camelCase) name of a form field.
pub fn wire_name(field: &str) -> String {
    if field == "no_hp" {
        return "noHP".to_string();
    }
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Flattens validator output into a stable, field-sorted list.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = wire_name(field.as_ref());
            errs.iter().map(move |e| FieldError {
                field: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field).then(a.message.cmp(&b.message)));
    out
}
