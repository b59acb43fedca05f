//! Checkout request shape and fail-fast validation.
//!
//! Everything that can be checked without the catalog or the identity store
//! is checked here, before the storefront opens a transaction. A request
//! that fails validation never causes a write.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Email, EmailError, Money, PaymentMethod, ProductId, UserId, WebsiteId};

/// Longest accepted guest name or phone number.
const MAX_CONTACT_FIELD: usize = 255;

/// Longest accepted shipping address.
const MAX_ADDRESS: usize = 2000;

/// A checkout submission as posted by the storefront client.
///
/// Field names follow the public JSON API. Blank strings are treated as
/// absent, so `"guest_email": ""` is the same as omitting the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Owner claimed in the body. Only honored as described by the
    /// storefront's identity policy.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Tenant the client believes it is talking to.
    #[serde(default)]
    pub website_id: Option<WebsiteId>,
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub guest_email: Option<String>,
    #[serde(default)]
    pub guest_phone: Option<String>,
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    /// Total the client displayed to the customer.
    pub total_amount: Decimal,
    pub shipping_address: String,
    /// Defaults to cash on delivery.
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

/// One requested line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price the client displayed, if any.
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// What is wrong with the requested lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineItemIssue {
    /// The order has no lines at all.
    NoItems,
    /// Product id is zero or negative.
    InvalidProduct { index: usize },
    /// Quantity is zero or negative.
    NonPositiveQuantity { index: usize },
    /// Quoted unit price is negative.
    NegativePrice { index: usize },
    /// Product does not exist in this website's catalog.
    UnknownProduct { product_id: ProductId },
}

impl std::fmt::Display for LineItemIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "order must contain at least one item"),
            Self::InvalidProduct { index } => write!(f, "item {index}: invalid product id"),
            Self::NonPositiveQuantity { index } => {
                write!(f, "item {index}: quantity must be at least 1")
            }
            Self::NegativePrice { index } => write!(f, "item {index}: price cannot be negative"),
            Self::UnknownProduct { product_id } => write!(f, "product {product_id} not found"),
        }
    }
}

/// Reasons a checkout request is rejected before touching storage.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// A line item is missing or malformed.
    #[error("invalid line item: {0}")]
    InvalidLineItem(LineItemIssue),

    /// Shipping address is blank.
    #[error("shipping address is required")]
    MissingShippingAddress,

    /// Client total is negative.
    #[error("total amount cannot be negative")]
    NegativeTotal,

    /// Guest email was supplied but is not an email address.
    #[error("invalid guest email: {0}")]
    InvalidGuestEmail(#[from] EmailError),

    /// A free-text field exceeds its limit.
    #[error("{field} must be at most {max} characters")]
    FieldTooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
    },

    /// A guest order has no email, so it could never be tracked.
    #[error("guest checkout requires a contact email")]
    MissingContact,
}

/// Guest contact details, trimmed and validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuestContact {
    pub name: Option<String>,
    pub email: Option<Email>,
    pub phone: Option<String>,
}

/// A requested line after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidItem {
    pub product_id: ProductId,
    pub quantity: i32,
    pub quoted_price: Option<Money>,
}

/// A checkout request that passed every storage-independent check.
#[derive(Debug, Clone)]
pub struct ValidCheckout {
    pub claimed_owner: Option<UserId>,
    pub website_id: Option<WebsiteId>,
    pub guest: GuestContact,
    pub items: Vec<ValidItem>,
    pub total_amount: Money,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
}

impl CheckoutRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, checking line items first.
    pub fn validate(self) -> Result<ValidCheckout, CheckoutError> {
        if self.items.is_empty() {
            return Err(CheckoutError::InvalidLineItem(LineItemIssue::NoItems));
        }

        let mut items = Vec::with_capacity(self.items.len());
        for (index, item) in self.items.into_iter().enumerate() {
            items.push(item.validate(index)?);
        }

        let shipping_address = self.shipping_address.trim();
        if shipping_address.is_empty() {
            return Err(CheckoutError::MissingShippingAddress);
        }
        check_length("shipping_address", shipping_address, MAX_ADDRESS)?;

        let total_amount = Money::new(self.total_amount).map_err(|_| CheckoutError::NegativeTotal)?;

        let name = non_blank(self.guest_name);
        let phone = non_blank(self.guest_phone);
        if let Some(name) = &name {
            check_length("guest_name", name, MAX_CONTACT_FIELD)?;
        }
        if let Some(phone) = &phone {
            check_length("guest_phone", phone, MAX_CONTACT_FIELD)?;
        }
        let email = non_blank(self.guest_email)
            .map(|e| Email::parse(&e))
            .transpose()?;

        Ok(ValidCheckout {
            claimed_owner: self.user_id,
            website_id: self.website_id,
            guest: GuestContact { name, email, phone },
            items,
            total_amount,
            shipping_address: shipping_address.to_owned(),
            payment_method: self.payment_method.unwrap_or_default(),
        })
    }
}

impl CheckoutItem {
    fn validate(self, index: usize) -> Result<ValidItem, CheckoutError> {
        if !self.product_id.is_assigned() {
            return Err(CheckoutError::InvalidLineItem(
                LineItemIssue::InvalidProduct { index },
            ));
        }
        if self.quantity <= 0 {
            return Err(CheckoutError::InvalidLineItem(
                LineItemIssue::NonPositiveQuantity { index },
            ));
        }
        let quoted_price = self
            .price
            .map(Money::new)
            .transpose()
            .map_err(|_| CheckoutError::InvalidLineItem(LineItemIssue::NegativePrice { index }))?;

        Ok(ValidItem {
            product_id: self.product_id,
            quantity: self.quantity,
            quoted_price,
        })
    }
}

impl ValidCheckout {
    /// Total quantity requested per product, in ascending product order.
    ///
    /// Storage locks products in this order, so two checkouts touching the
    /// same products can never wait on each other in a cycle.
    #[must_use]
    pub fn quantities_by_product(&self) -> Vec<(ProductId, i64)> {
        let mut totals = std::collections::BTreeMap::new();
        for item in &self.items {
            *totals.entry(item.product_id).or_insert(0_i64) += i64::from(item.quantity);
        }
        totals.into_iter().collect()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), CheckoutError> {
    if value.chars().count() > max {
        return Err(CheckoutError::FieldTooLong { field, max });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn request(items: serde_json::Value) -> CheckoutRequest {
        serde_json::from_value(serde_json::json!({
            "items": items,
            "total_amount": "20.00",
            "shipping_address": "1 Market St",
        }))
        .unwrap()
    }

    #[test]
    fn test_minimal_request_defaults() {
        let checkout = request(serde_json::json!([
            {"product_id": 1, "quantity": 2, "price": 10.00}
        ]))
        .validate()
        .unwrap();

        assert_eq!(checkout.payment_method, PaymentMethod::CashOnDelivery);
        assert_eq!(checkout.claimed_owner, None);
        assert_eq!(checkout.guest, GuestContact::default());
        assert_eq!(checkout.items.len(), 1);
        assert_eq!(checkout.items[0].quantity, 2);
        assert_eq!(checkout.total_amount, Money::from_cents(2000).unwrap());
    }

    #[test]
    fn test_empty_items_rejected() {
        let err = request(serde_json::json!([])).validate().unwrap_err();
        assert_eq!(err, CheckoutError::InvalidLineItem(LineItemIssue::NoItems));
    }

    #[test]
    fn test_missing_items_field_rejected() {
        let req: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "total_amount": 0,
            "shipping_address": "1 Market St",
        }))
        .unwrap();
        assert!(matches!(
            req.validate(),
            Err(CheckoutError::InvalidLineItem(LineItemIssue::NoItems))
        ));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let err = request(serde_json::json!([
            {"product_id": 1, "quantity": 1},
            {"product_id": 2, "quantity": 0}
        ]))
        .validate()
        .unwrap_err();
        assert_eq!(
            err,
            CheckoutError::InvalidLineItem(LineItemIssue::NonPositiveQuantity { index: 1 })
        );
    }

    #[test]
    fn test_invalid_product_rejected() {
        let err = request(serde_json::json!([{"product_id": 0, "quantity": 1}]))
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            CheckoutError::InvalidLineItem(LineItemIssue::InvalidProduct { index: 0 })
        );
    }

    #[test]
    fn test_negative_price_rejected() {
        let err = request(serde_json::json!([{"product_id": 3, "quantity": 1, "price": "-5"}]))
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            CheckoutError::InvalidLineItem(LineItemIssue::NegativePrice { index: 0 })
        );
    }

    #[test]
    fn test_blank_address_rejected() {
        let mut req = request(serde_json::json!([{"product_id": 1, "quantity": 1}]));
        req.shipping_address = "   ".to_owned();
        assert_eq!(req.validate().unwrap_err(), CheckoutError::MissingShippingAddress);
    }

    #[test]
    fn test_negative_total_rejected() {
        let mut req = request(serde_json::json!([{"product_id": 1, "quantity": 1}]));
        req.total_amount = Decimal::new(-100, 2);
        assert_eq!(req.validate().unwrap_err(), CheckoutError::NegativeTotal);
    }

    #[test]
    fn test_blank_guest_fields_are_absent() {
        let mut req = request(serde_json::json!([{"product_id": 1, "quantity": 1}]));
        req.guest_email = Some("  ".to_owned());
        req.guest_name = Some(String::new());
        let checkout = req.validate().unwrap();
        assert_eq!(checkout.guest.email, None);
        assert_eq!(checkout.guest.name, None);
    }

    #[test]
    fn test_bad_guest_email_rejected() {
        let mut req = request(serde_json::json!([{"product_id": 1, "quantity": 1}]));
        req.guest_email = Some("not-an-email".to_owned());
        assert!(matches!(
            req.validate(),
            Err(CheckoutError::InvalidGuestEmail(_))
        ));
    }

    #[test]
    fn test_quantities_by_product_aggregates_and_sorts() {
        let checkout = request(serde_json::json!([
            {"product_id": 9, "quantity": 1},
            {"product_id": 2, "quantity": 3},
            {"product_id": 9, "quantity": 4}
        ]))
        .validate()
        .unwrap();

        assert_eq!(
            checkout.quantities_by_product(),
            vec![(ProductId::new(2), 3), (ProductId::new(9), 5)]
        );
    }
}
