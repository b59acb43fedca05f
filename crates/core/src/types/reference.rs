//! Customer-facing order references.
//!
//! Confirmation emails print order numbers as `ORD-00042`, and customers
//! paste whatever they were given into the tracking form. The numeric id is
//! the first run of ASCII digits in the reference.

use crate::OrderId;

/// Extract an [`OrderId`] from a customer-supplied reference.
///
/// Returns `None` when the reference contains no digits, when the digits do
/// not fit an `i32`, or when they spell zero.
///
/// ```
/// use bazaar_core::{OrderId, parse_order_reference};
///
/// assert_eq!(parse_order_reference("ORD-00042"), Some(OrderId::new(42)));
/// assert_eq!(parse_order_reference("#17"), Some(OrderId::new(17)));
/// assert_eq!(parse_order_reference("no digits"), None);
/// ```
#[must_use]
pub fn parse_order_reference(reference: &str) -> Option<OrderId> {
    let start = reference.find(|c: char| c.is_ascii_digit())?;
    let rest = reference.get(start..)?;
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let id: i32 = rest.get(..end)?.parse().ok()?;
    let id = OrderId::new(id);
    id.is_assigned().then_some(id)
}

/// Format an order id the way it is shown to customers.
#[must_use]
pub fn format_order_reference(id: OrderId) -> String {
    format!("ORD-{:05}", id.as_i32())
}
