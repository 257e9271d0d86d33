use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AppError;

/// Largest number of fractional digits a money value may carry; matches the
/// `NUMERIC(20, 2)` columns.
pub const MONEY_SCALE: u32 = 2;

/// Exclusive upper bound of a money value: `NUMERIC(20, 2)` leaves 18
/// integer digits, so every stored amount is below 10^18.
pub const MONEY_LIMIT: Decimal = Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0);

pub fn within_money_range(value: Decimal) -> bool {
    value < MONEY_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Implemented by every request payload that reaches a service.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// Collects every failing rule instead of stopping at the first one.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, format!("{field} is a required field"))
    }

    pub fn positive_amount(&mut self, field: &str, value: Decimal) -> &mut Self {
        if value <= Decimal::ZERO {
            return self.check(false, field, format!("{field} must be greater than 0"));
        }
        self.money(field, value)
    }

    pub fn non_negative_amount(&mut self, field: &str, value: Decimal) -> &mut Self {
        if value.is_sign_negative() && !value.is_zero() {
            return self.check(false, field, format!("{field} must be 0 or greater"));
        }
        self.money(field, value)
    }

    // range and scale of a value already known to have the right sign
    fn money(&mut self, field: &str, value: Decimal) -> &mut Self {
        if !within_money_range(value) {
            return self.check(false, field, format!("{field} must be less than {MONEY_LIMIT}"));
        }
        self.check(
            value.normalize().scale() <= MONEY_SCALE,
            field,
            format!("{field} must have at most {MONEY_SCALE} decimal places"),
        )
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rust_decimal::Decimal;

    use super::*;

    fn errors_of(result: Result<(), AppError>) -> Vec<FieldError> {
        match result {
            Err(AppError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_passes_when_every_rule_holds() {
        let result = Validator::new()
            .required("name", "mug")
            .positive_amount("amount", Decimal::new(1050, 2))
            .finish();
        assert!(result.is_ok());
    }

    #[test]
    fn test_collects_all_failures_in_order() {
        let errors = errors_of(
            Validator::new()
                .required("name", "   ")
                .positive_amount("amount", Decimal::ZERO)
                .finish(),
        );

        assert_eq!(
            errors,
            vec![
                FieldError::new("name", "name is a required field"),
                FieldError::new("amount", "amount must be greater than 0"),
            ]
        );
    }

    #[rstest]
    #[case::negative(Decimal::new(-1, 0), "amount must be greater than 0")]
    #[case::zero(Decimal::ZERO, "amount must be greater than 0")]
    #[case::too_precise(Decimal::new(1001, 3), "amount must have at most 2 decimal places")]
    #[case::at_column_limit(MONEY_LIMIT, "amount must be less than 1000000000000000000")]
    #[case::decimal_max(Decimal::MAX, "amount must be less than 1000000000000000000")]
    fn test_positive_amount_rejects(#[case] value: Decimal, #[case] message: &str) {
        let errors = errors_of(Validator::new().positive_amount("amount", value).finish());
        assert_eq!(errors[0].message, message);
    }

    #[test]
    fn test_trailing_zeros_do_not_count_as_precision() {
        // 12.5000 normalizes to 12.5
        let result = Validator::new()
            .positive_amount("amount", Decimal::new(125000, 4))
            .finish();
        assert!(result.is_ok());
    }

    #[test]
    fn test_money_limit_is_ten_to_the_eighteenth() {
        assert_eq!(MONEY_LIMIT, Decimal::from(1_000_000_000_000_000_000i64));
        assert!(within_money_range(Decimal::from_i128_with_scale(99_999_999_999_999_999_999, 2)));
    }

    #[rstest]
    #[case::zero(Decimal::ZERO, true)]
    #[case::positive(Decimal::new(999, 2), true)]
    #[case::negative(Decimal::new(-1, 2), false)]
    #[case::over_column_range(Decimal::from(10_000_000_000_000_000_000i128), false)]
    fn test_non_negative_amount(#[case] value: Decimal, #[case] ok: bool) {
        let result = Validator::new().non_negative_amount("price", value).finish();
        assert_eq!(result.is_ok(), ok);
    }
}
