use crate::domain::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value <= 0.0 {
            return Err(ValidationError::InvalidPrice(value));
        }
        Ok(Price(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_new_valid() {
        let price = Price::new(100.0);
        assert!(price.is_ok());
        assert_eq!(price.unwrap().value(), 100.0);
    }

    #[test]
    fn test_price_new_zero_rejected() {
        assert_eq!(
            Price::new(0.0).unwrap_err(),
            ValidationError::InvalidPrice(0.0)
        );
    }

    #[test]
    fn test_price_new_negative_rejected() {
        assert_eq!(
            Price::new(-10.0).unwrap_err(),
            ValidationError::InvalidPrice(-10.0)
        );
    }

    #[test]
    fn test_price_new_nan_rejected() {
        assert_eq!(
            Price::new(f64::NAN).unwrap_err(),
            ValidationError::MustBeFinite
        );
    }
}
