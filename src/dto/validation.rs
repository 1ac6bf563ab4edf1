//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates an ISO week bucket such as `2026-W07`.
///
/// # Examples
///
/// ```ignore
/// validate_week("2026-W07") // Ok
/// validate_week("2026-W7")  // Err - week must have two digits
/// validate_week("2026-W54") // Err - out of range
/// ```
pub fn validate_week(week: &str) -> Result<(), ValidationError> {
    let Some((year, number)) = week.split_once("-W") else {
        let mut err = ValidationError::new("week_format");
        err.message = Some("Week must look like YYYY-Www".into());
        return Err(err);
    };

    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("week_year");
        err.message = Some(format!("Week year must be four digits (got `{year}`)").into());
        return Err(err);
    }

    let in_range = number.len() == 2
        && number.chars().all(|c| c.is_ascii_digit())
        && number
            .parse::<u8>()
            .is_ok_and(|value| (1..=53).contains(&value));
    if !in_range {
        let mut err = ValidationError::new("week_number");
        err.message = Some(format!("Week number must be 01 to 53 (got `{number}`)").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_week_valid() {
        assert!(validate_week("2026-W01").is_ok());
        assert!(validate_week("2026-W42").is_ok());
        assert!(validate_week("2020-W53").is_ok());
    }

    #[test]
    fn test_validate_week_invalid_format() {
        assert!(validate_week("2026W42").is_err());
        assert!(validate_week("26-W42").is_err());
        assert!(validate_week("2026-W4").is_err());
        assert!(validate_week("").is_err());
    }

    #[test]
    fn test_validate_week_out_of_range() {
        assert!(validate_week("2026-W00").is_err());
        assert!(validate_week("2026-W54").is_err());
    }
}
