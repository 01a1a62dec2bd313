//! Field validation for drone registration and cargo items
//!
//! Everything here is a pure function over its arguments, so it is safe to
//! call from any number of tasks at once.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::error::DispatchError;
use crate::limits;
use crate::protocol::MedicineDeclaration;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static pattern"));

static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9_-]+$").expect("static pattern"));

fn invalid(field: &'static str, reason: impl Into<String>) -> DispatchError {
    DispatchError::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// Validate the fields of a drone registration.
///
/// Returns the weight limit and battery level narrowed to their stored types.
pub fn validate_registration(
    serial_number: &str,
    weight_limit_grams: i64,
    battery_percentage: i64,
) -> Result<(u32, u8), DispatchError> {
    let len = serial_number.chars().count();
    if len == 0 || len > limits::SERIAL_NUMBER_MAX_LEN {
        return Err(invalid(
            "serialNumber",
            format!(
                "must be 1-{} characters, got {}",
                limits::SERIAL_NUMBER_MAX_LEN,
                len
            ),
        ));
    }

    let weight_limit = u32::try_from(weight_limit_grams)
        .ok()
        .filter(|w| (limits::WEIGHT_LIMIT_MIN_GRAMS..=limits::WEIGHT_LIMIT_MAX_GRAMS).contains(w))
        .ok_or_else(|| {
            invalid(
                "weightLimitGrams",
                format!(
                    "must be within {}-{}, got {}",
                    limits::WEIGHT_LIMIT_MIN_GRAMS,
                    limits::WEIGHT_LIMIT_MAX_GRAMS,
                    weight_limit_grams
                ),
            )
        })?;

    let battery = u8::try_from(battery_percentage)
        .ok()
        .filter(|b| *b <= limits::BATTERY_MAX_PERCENT)
        .ok_or_else(|| {
            invalid(
                "batteryPercentage",
                format!("must be within 0-100, got {}", battery_percentage),
            )
        })?;

    Ok((weight_limit, battery))
}

/// Check a medicine code against the code format
pub fn is_valid_code(code: &str) -> bool {
    CODE_PATTERN.is_match(code)
}

/// Validate one cargo declaration together with its image filename.
///
/// Returns the declared weight as an unsigned value on success.
pub fn validate_item(
    declaration: &MedicineDeclaration,
    image_filename: &str,
) -> Result<u32, DispatchError> {
    if !NAME_PATTERN.is_match(&declaration.name) {
        return Err(invalid(
            "name",
            format!(
                "{:?} may only contain letters, digits, '-' and '_'",
                declaration.name
            ),
        ));
    }

    let weight_grams = u32::try_from(declaration.weight_grams)
        .ok()
        .filter(|w| *w > 0)
        .ok_or_else(|| {
            invalid(
                "weightGrams",
                format!("must be a positive integer, got {}", declaration.weight_grams),
            )
        })?;

    if !is_valid_code(&declaration.code) {
        return Err(invalid(
            "code",
            format!(
                "{:?} may only contain upper case letters, digits, '-' and '_'",
                declaration.code
            ),
        ));
    }

    if !has_supported_image_extension(image_filename) {
        return Err(DispatchError::UnsupportedMediaType {
            filename: image_filename.to_string(),
        });
    }

    Ok(weight_grams)
}

/// Whether a filename ends in one of the accepted image extensions
pub fn has_supported_image_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            limits::IMAGE_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}
