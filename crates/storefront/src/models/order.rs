//! Order domain types.
//!
//! An order is written once by checkout and afterwards only changes its
//! fulfillment and payment status.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bazaar_core::{
    Email, FulfillmentStatus, Money, OrderId, OrderLineId, PaymentMethod, PaymentStatus,
    ProductId, UserId, WebsiteId, format_order_reference,
};

/// Order header to insert.
///
/// Guest fields are only set when `user_id` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub website_id: WebsiteId,
    pub user_id: Option<UserId>,
    pub guest_name: Option<String>,
    pub guest_email: Option<Email>,
    pub guest_phone: Option<String>,
    pub total_amount: Money,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: FulfillmentStatus,
}

/// Order line to insert, priced at checkout time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Money,
}

/// A stored order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: OrderId,
    pub website_id: WebsiteId,
    pub user_id: Option<UserId>,
    pub guest_name: Option<String>,
    pub guest_email: Option<Email>,
    pub guest_phone: Option<String>,
    pub total_amount: Money,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: FulfillmentStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Human-facing reference, e.g. `ORD-00042`.
    #[must_use]
    pub fn reference(&self) -> String {
        format_order_reference(self.id)
    }

    /// Whether this order was placed without an account.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        self.user_id.is_none()
    }
}

/// Order as listed in the admin overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: OrderRecord,
    /// Owner name, `"<guest name> (Guest)"`, or `"Guest"`.
    pub display_name: String,
    /// Owner email for registered orders, guest email otherwise.
    pub display_email: Option<Email>,
    pub website_name: String,
}

impl OrderSummary {
    /// Build a summary from an order and its owner's name and email, if any.
    #[must_use]
    pub fn new(
        order: OrderRecord,
        owner: Option<(String, Email)>,
        website_name: String,
    ) -> Self {
        let (display_name, display_email) = match owner {
            Some((name, email)) => (name, Some(email)),
            None => {
                let name = match &order.guest_name {
                    Some(guest) => format!("{guest} (Guest)"),
                    None => "Guest".to_owned(),
                };
                (name, order.guest_email.clone())
            }
        };

        Self {
            order,
            display_name,
            display_email,
            website_name,
        }
    }
}

/// A stored order line joined with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub product_name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    /// Unit price captured at checkout.
    pub price: Money,
}

/// Full order view: header, customer contact and lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderRecord,
    pub reference: String,
    /// Owner name for registered orders, guest name otherwise.
    pub customer_name: Option<String>,
    /// Owner email for registered orders, guest email otherwise.
    pub customer_email: Option<Email>,
    pub items: Vec<OrderLine>,
}

impl OrderDetail {
    /// Assemble a detail view; the owner, when present, wins over guest fields.
    #[must_use]
    pub fn new(order: OrderRecord, owner: Option<(String, Email)>, items: Vec<OrderLine>) -> Self {
        let (customer_name, customer_email) = match owner {
            Some((name, email)) => (Some(name), Some(email)),
            None => (order.guest_name.clone(), order.guest_email.clone()),
        };

        Self {
            reference: order.reference(),
            order,
            customer_name,
            customer_email,
            items,
        }
    }
}

/// Which orders to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFilter {
    pub website_id: WebsiteId,
    /// Restrict to one owner.
    pub user_id: Option<UserId>,
}

impl OrderFilter {
    /// Every order of a website.
    #[must_use]
    pub const fn website(website_id: WebsiteId) -> Self {
        Self {
            website_id,
            user_id: None,
        }
    }

    /// Orders of one owner within a website.
    #[must_use]
    pub const fn owner(website_id: WebsiteId, user_id: UserId) -> Self {
        Self {
            website_id,
            user_id: Some(user_id),
        }
    }
}

/// What a successful checkout returns to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub reference: String,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: FulfillmentStatus,
}

impl From<&OrderRecord> for OrderReceipt {
    fn from(order: &OrderRecord) -> Self {
        Self {
            order_id: order.id,
            reference: order.reference(),
            total_amount: order.total_amount,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            status: order.status,
        }
    }
}
