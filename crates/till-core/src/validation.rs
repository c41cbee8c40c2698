//! # Validation Module
//!
//! Input validation utilities, run at the engine boundary before business
//! logic. The database enforces the same rules again through NOT NULL and
//! UNIQUE constraints.

use crate::error::ValidationError;
use crate::types::CustomerInfo;
use crate::MAX_LINE_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Cart Inputs
// =============================================================================

/// Validates a requested cart quantity (1..=MAX_LINE_QUANTITY).
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 || quantity > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a SKU code.
///
/// ## Rules
/// - not empty, at most 50 characters
/// - alphanumeric plus hyphen/underscore
pub fn validate_sku_code(sku_code: &str) -> ValidationResult<()> {
    let sku_code = sku_code.trim();

    if sku_code.is_empty() {
        return Err(ValidationError::Required {
            field: "skuCode".to_string(),
        });
    }
    if sku_code.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "skuCode".to_string(),
            max: 50,
        });
    }
    if !sku_code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "skuCode".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Customer Draft
// =============================================================================

/// Validates a customer draft before it is persisted as a real customer.
///
/// A draft may sit on a session in any shape; only the explicit
/// save-customer path runs this.
pub fn validate_customer_draft(draft: &CustomerInfo) -> ValidationResult<()> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }
    if name.len() > 120 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 120,
        });
    }

    if let Some(email) = draft.email.as_deref() {
        let email = email.trim();
        if !email.is_empty() && (!email.contains('@') || email.starts_with('@') || email.ends_with('@')) {
            return Err(ValidationError::InvalidFormat {
                field: "email".to_string(),
                reason: "not a valid email address".to_string(),
            });
        }
    }

    if let Some(phone) = draft.phone.as_deref() {
        let phone = phone.trim();
        if !phone.is_empty()
            && !phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
        {
            return Err(ValidationError::InvalidFormat {
                field: "phone".to_string(),
                reason: "must contain only digits and phone punctuation".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Session Inputs
// =============================================================================

/// Validates a hold reason (optional, but bounded when present).
pub fn validate_hold_reason(reason: &str) -> ValidationResult<()> {
    if reason.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "holdReason".to_string(),
            max: 200,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_sku_code() {
        assert!(validate_sku_code("WIG-001").is_ok());
        assert!(validate_sku_code("").is_err());
        assert!(validate_sku_code("has spaces").is_err());
        assert!(validate_sku_code(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_customer_draft() {
        let draft = CustomerInfo {
            name: "Amina Bello".to_string(),
            email: Some("amina@example.com".to_string()),
            phone: Some("+1 (555) 010-2020".to_string()),
        };
        assert!(validate_customer_draft(&draft).is_ok());

        let nameless = CustomerInfo {
            name: "  ".to_string(),
            ..draft.clone()
        };
        assert!(validate_customer_draft(&nameless).is_err());

        let bad_email = CustomerInfo {
            email: Some("not-an-email".to_string()),
            ..draft.clone()
        };
        assert!(validate_customer_draft(&bad_email).is_err());

        let bad_phone = CustomerInfo {
            phone: Some("call me".to_string()),
            ..draft
        };
        assert!(validate_customer_draft(&bad_phone).is_err());
    }

    #[test]
    fn test_validate_hold_reason() {
        assert!(validate_hold_reason("customer stepped away").is_ok());
        assert!(validate_hold_reason(&"x".repeat(201)).is_err());
    }
}
