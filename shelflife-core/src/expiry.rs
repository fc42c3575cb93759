//! Expiry-date arithmetic.

use chrono::{Days, NaiveDate};

use crate::error::ValidationError;
use crate::ProductRecord;

const INPUT_DATE_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_DATE_FORMAT: &str = "%d.%m.%Y";

/// Add the shelf life (in calendar days) to the production date.
///
/// Returns `None` only when the result falls outside the supported calendar.
pub fn compute_expiry(production: NaiveDate, shelf_life_days: u32) -> Option<NaiveDate> {
    production.checked_add_days(Days::new(u64::from(shelf_life_days)))
}

/// Parse a production date in `YYYY-MM-DD` form.
pub fn parse_production_date(input: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingInput {
            field: "production_date",
        });
    }
    NaiveDate::parse_from_str(trimmed, INPUT_DATE_FORMAT).map_err(|e| {
        ValidationError::InvalidValue {
            field: "production_date",
            reason: e.to_string(),
        }
    })
}

/// Render an expiry date as `DD.MM.YYYY`.
pub fn format_expiry(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

/// A calculation request as assembled from user input.
///
/// Both parts are optional until the user has picked a product and a date.
#[derive(Debug, Clone, Default)]
pub struct ExpiryRequest<'a> {
    pub product: Option<&'a ProductRecord>,
    pub production_date: Option<NaiveDate>,
}

impl<'a> ExpiryRequest<'a> {
    pub fn new(product: Option<&'a ProductRecord>, production_date: Option<NaiveDate>) -> Self {
        Self {
            product,
            production_date,
        }
    }

    pub fn calculate(&self) -> Result<NaiveDate, ValidationError> {
        let product = self
            .product
            .ok_or(ValidationError::MissingInput { field: "product" })?;
        let production = self.production_date.ok_or(ValidationError::MissingInput {
            field: "production_date",
        })?;
        compute_expiry(production, product.shelf_life_days).ok_or_else(|| {
            ValidationError::InvalidValue {
                field: "shelf_life_days",
                reason: format!(
                    "{} days from {} overflows the calendar",
                    product.shelf_life_days, production
                ),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_compute_expiry_simple() {
        assert_eq!(compute_expiry(date(2024, 1, 1), 10), Some(date(2024, 1, 11)));
    }

    #[test]
    fn test_compute_expiry_crosses_leap_day() {
        assert_eq!(compute_expiry(date(2024, 2, 28), 2), Some(date(2024, 3, 1)));
        assert_eq!(compute_expiry(date(2023, 12, 1), 365), Some(date(2024, 11, 30)));
    }

    #[test]
    fn test_parse_production_date() {
        assert_eq!(parse_production_date("2024-01-01"), Ok(date(2024, 1, 1)));
        assert_eq!(
            parse_production_date("  "),
            Err(ValidationError::MissingInput {
                field: "production_date"
            })
        );
        assert!(matches!(
            parse_production_date("01.01.2024"),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_format_expiry() {
        assert_eq!(format_expiry(date(2024, 1, 11)), "11.01.2024");
    }

    #[test]
    fn test_request_requires_product_and_date() {
        let record = ProductRecord::new("1", "Milk", 10);
        assert_eq!(
            ExpiryRequest::new(None, Some(date(2024, 1, 1))).calculate(),
            Err(ValidationError::MissingInput { field: "product" })
        );
        assert_eq!(
            ExpiryRequest::new(Some(&record), None).calculate(),
            Err(ValidationError::MissingInput {
                field: "production_date"
            })
        );
        assert_eq!(
            ExpiryRequest::new(Some(&record), Some(date(2024, 1, 1))).calculate(),
            Ok(date(2024, 1, 11))
        );
    }
}
