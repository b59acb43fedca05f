//! Order placement and order management.
//!
//! [`OrderService::place_order`] runs a checkout as one storage
//! transaction:
//!
//! 1. resolve the owner (registered account or guest)
//! 2. lock every referenced product in ascending id order
//! 3. check aggregated quantities against stock
//! 4. price every line from the catalog and compare with the client
//! 5. insert the order header and its lines
//! 6. decrement stock with a conditional update
//! 7. clear the owner's saved cart
//! 8. commit
//!
//! Any failure rolls everything back, so the caller either gets an order id
//! or an error and no order.

mod error;
mod identity;

pub use error::{CheckoutStep, OrderError};
pub use identity::{IdentityResolver, OwnerClaim};

use std::collections::BTreeMap;

use bazaar_core::{
    CheckoutError, CheckoutRequest, Email, FulfillmentStatus, LineItemIssue, Money, OrderId,
    PaymentStatus, ProductId, UserId, ValidCheckout, parse_order_reference,
};

use crate::config::CheckoutConfig;
use crate::db::{CheckoutTransaction, StockUpdate, Storage};
use crate::models::{
    CatalogProduct, Identity, NewOrder, NewOrderLine, OrderDetail, OrderFilter, OrderLine,
    OrderReceipt, OrderSummary,
};

/// Result of a successful checkout.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub receipt: OrderReceipt,
    /// The stored order, as `get_order_by_id` would return it.
    pub detail: OrderDetail,
}

/// Order service.
///
/// Borrowing the storage keeps the service cheap to build per request.
pub struct OrderService<'a, S: ?Sized> {
    store: &'a S,
    config: &'a CheckoutConfig,
}

impl<'a, S: Storage + ?Sized> OrderService<'a, S> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(store: &'a S, config: &'a CheckoutConfig) -> Self {
        Self { store, config }
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Place an order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Invalid` if the request is malformed or names an
    /// unknown product, `OrderError::IdentityUnresolvable` if the owner claim
    /// is rejected, `OrderError::InsufficientStock`, `OrderError::PriceMismatch`
    /// or `OrderError::TotalMismatch` if the catalog disagrees, and
    /// `OrderError::Persistence` if a write fails. No order exists after any
    /// error.
    pub async fn place_order(
        &self,
        claim: OwnerClaim,
        request: CheckoutRequest,
    ) -> Result<PlacedOrder, OrderError> {
        let checkout = request.validate()?;

        if checkout
            .website_id
            .is_some_and(|website_id| website_id != self.config.website_id)
        {
            return Err(OrderError::WrongWebsite);
        }

        let claim = OwnerClaim {
            body_user_id: checkout.claimed_owner,
            ..claim
        };
        let owner = IdentityResolver::new(self.store, self.config.identity_policy)
            .resolve(claim)
            .await?;

        if owner.is_none() && checkout.guest.email.is_none() {
            return Err(CheckoutError::MissingContact.into());
        }

        let mut tx = self
            .store
            .begin_checkout()
            .await
            .map_err(OrderError::at(CheckoutStep::Begin))?;

        let placed = match self.write_order(tx.as_mut(), &checkout, owner.as_ref()).await {
            Ok(placed) => placed,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "checkout rollback failed");
                }
                log_rejection(&e, owner.as_ref(), &checkout);
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            let e = OrderError::at(CheckoutStep::Commit)(e);
            log_rejection(&e, owner.as_ref(), &checkout);
            return Err(e);
        }

        tracing::info!(
            order_id = %placed.receipt.order_id,
            owner = ?owner.as_ref().map(|o| o.id),
            items = checkout.items.len(),
            total = %placed.receipt.total_amount,
            payment_method = %placed.receipt.payment_method,
            "order placed"
        );

        Ok(placed)
    }

    async fn write_order(
        &self,
        tx: &mut dyn CheckoutTransaction,
        checkout: &ValidCheckout,
        owner: Option<&Identity>,
    ) -> Result<PlacedOrder, OrderError> {
        let website_id = self.config.website_id;
        let tolerance = self.config.price_tolerance;
        let quantities = checkout.quantities_by_product();

        // Ascending product id order; see `ValidCheckout::quantities_by_product`.
        let mut products: BTreeMap<ProductId, CatalogProduct> = BTreeMap::new();
        for &(product_id, requested) in &quantities {
            let product = tx
                .lock_product(website_id, product_id)
                .await
                .map_err(OrderError::at(CheckoutStep::LockProduct))?
                .ok_or(CheckoutError::InvalidLineItem(
                    LineItemIssue::UnknownProduct { product_id },
                ))?;

            if i64::from(product.stock) < requested {
                return Err(OrderError::InsufficientStock {
                    product_id,
                    requested,
                    available: product.stock,
                });
            }
            products.insert(product_id, product);
        }

        let mut line_totals = Vec::with_capacity(checkout.items.len());
        for item in &checkout.items {
            let product = catalog_entry(&products, item.product_id)?;
            if let Some(quoted) = item.quoted_price
                && !quoted.within(product.price, tolerance)
            {
                return Err(OrderError::PriceMismatch {
                    product_id: item.product_id,
                    quoted,
                    current: product.price,
                });
            }
            line_totals.push(
                product
                    .price
                    .times(item.quantity)
                    .map_err(|_| OrderError::AmountOutOfRange)?,
            );
        }

        let computed = Money::try_sum(line_totals).map_err(|_| OrderError::AmountOutOfRange)?;
        if !checkout.total_amount.within(computed, tolerance) {
            return Err(OrderError::TotalMismatch {
                quoted: checkout.total_amount,
                computed,
            });
        }

        // Registered orders never carry guest contact fields.
        let guest = if owner.is_some() {
            bazaar_core::GuestContact::default()
        } else {
            checkout.guest.clone()
        };
        let new_order = NewOrder {
            website_id,
            user_id: owner.map(|o| o.id),
            guest_name: guest.name,
            guest_email: guest.email,
            guest_phone: guest.phone,
            total_amount: computed,
            shipping_address: checkout.shipping_address.clone(),
            payment_method: checkout.payment_method,
            payment_status: checkout.payment_method.initial_payment_status(),
            status: FulfillmentStatus::Pending,
        };
        let order = tx
            .insert_order(&new_order)
            .await
            .map_err(OrderError::at(CheckoutStep::InsertOrder))?;

        let mut lines = Vec::with_capacity(checkout.items.len());
        for item in &checkout.items {
            let product = catalog_entry(&products, item.product_id)?;
            let line = NewOrderLine {
                order_id: order.id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: product.price,
            };
            let id = tx
                .insert_order_line(&line)
                .await
                .map_err(OrderError::at(CheckoutStep::InsertOrderLine))?;
            lines.push(OrderLine {
                id,
                product_id: product.id,
                product_name: product.name.clone(),
                image_url: product.image_url.clone(),
                quantity: item.quantity,
                price: product.price,
            });
        }

        for &(product_id, requested) in &quantities {
            let available = catalog_entry(&products, product_id)?.stock;
            let insufficient = OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            };
            let Ok(quantity) = i32::try_from(requested) else {
                return Err(insufficient);
            };
            match tx
                .decrement_stock(product_id, quantity)
                .await
                .map_err(OrderError::at(CheckoutStep::DecrementStock))?
            {
                StockUpdate::Applied => {}
                StockUpdate::Insufficient => return Err(insufficient),
                StockUpdate::Missing => {
                    return Err(CheckoutError::InvalidLineItem(LineItemIssue::UnknownProduct {
                        product_id,
                    })
                    .into());
                }
            }
        }

        if let Some(owner) = owner {
            let removed = tx
                .clear_cart(owner.id)
                .await
                .map_err(OrderError::at(CheckoutStep::ClearCart))?;
            tracing::debug!(user_id = %owner.id, removed, "cart cleared");
        }

        let owner_contact = owner.map(|o| (o.name.clone(), o.email.clone()));
        Ok(PlacedOrder {
            receipt: OrderReceipt::from(&order),
            detail: OrderDetail::new(order, owner_contact, lines),
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Every order of this website, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn get_all_orders(&self) -> Result<Vec<OrderSummary>, OrderError> {
        Ok(self
            .store
            .list_orders(&OrderFilter::website(self.config.website_id))
            .await?)
    }

    /// Orders placed by `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn get_user_orders(&self, user_id: UserId) -> Result<Vec<OrderSummary>, OrderError> {
        Ok(self
            .store
            .list_orders(&OrderFilter::owner(self.config.website_id, user_id))
            .await?)
    }

    /// A single order with its lines, visible to its owner and to admins.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist or belongs
    /// to someone else.
    pub async fn get_order_by_id(
        &self,
        viewer: &Identity,
        id: OrderId,
    ) -> Result<OrderDetail, OrderError> {
        let detail = self.load(id).await?;
        if viewer.is_admin() || detail.order.user_id == Some(viewer.id) {
            Ok(detail)
        } else {
            Err(OrderError::NotFound)
        }
    }

    /// Look up an order by reference and contact email.
    ///
    /// The reference may carry a prefix (`ORD-0042`); its first run of
    /// digits is the order id. The email must match the guest email or the
    /// owner's email, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for any reference/email pair that
    /// does not identify an order, without saying which part was wrong.
    pub async fn track_order(&self, reference: &str, email: &str) -> Result<OrderDetail, OrderError> {
        let id = parse_order_reference(reference).ok_or(OrderError::NotFound)?;
        let email = Email::parse(email).map_err(|_| OrderError::NotFound)?;

        self.store
            .find_for_tracking(self.config.website_id, id, &email)
            .await?
            .ok_or(OrderError::NotFound)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Move an order to `next` along the fulfillment state machine.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for unknown orders,
    /// `OrderError::InvalidTransition` if the state machine forbids the
    /// change and `OrderError::StatusConflict` if the status changed
    /// between reading and writing.
    pub async fn update_order_status(
        &self,
        id: OrderId,
        next: FulfillmentStatus,
    ) -> Result<OrderDetail, OrderError> {
        let current = self.load(id).await?.order.status;
        if !current.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        if !self
            .store
            .transition_status(self.config.website_id, id, current, next)
            .await?
        {
            return Err(OrderError::StatusConflict);
        }

        tracing::info!(order_id = %id, from = %current, to = %next, "order status updated");
        self.load(id).await
    }

    /// Record that a pending payment has been received.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for unknown orders and
    /// `OrderError::PaymentAlreadyCompleted` if there is nothing to confirm.
    pub async fn confirm_payment(&self, id: OrderId) -> Result<OrderDetail, OrderError> {
        let detail = self.load(id).await?;
        if detail.order.payment_status == PaymentStatus::Completed {
            return Err(OrderError::PaymentAlreadyCompleted);
        }

        if !self
            .store
            .transition_payment(
                self.config.website_id,
                id,
                PaymentStatus::Pending,
                PaymentStatus::Completed,
            )
            .await?
        {
            return Err(OrderError::PaymentAlreadyCompleted);
        }

        tracing::info!(order_id = %id, "payment confirmed");
        self.load(id).await
    }

    async fn load(&self, id: OrderId) -> Result<OrderDetail, OrderError> {
        self.store
            .get_order(self.config.website_id, id)
            .await?
            .ok_or(OrderError::NotFound)
    }
}

fn catalog_entry(
    products: &BTreeMap<ProductId, CatalogProduct>,
    product_id: ProductId,
) -> Result<&CatalogProduct, OrderError> {
    products.get(&product_id).ok_or_else(|| {
        CheckoutError::InvalidLineItem(LineItemIssue::UnknownProduct { product_id }).into()
    })
}

fn log_rejection(error: &OrderError, owner: Option<&Identity>, checkout: &ValidCheckout) {
    let owner = owner.map(|o| o.id);
    match error {
        OrderError::Persistence { step, source } => tracing::error!(
            step = %step,
            owner = ?owner,
            guest = owner.is_none(),
            items = checkout.items.len(),
            error = %source,
            "order could not be placed"
        ),
        other => tracing::info!(
            owner = ?owner,
            items = checkout.items.len(),
            reason = %other,
            "checkout rejected"
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests;
