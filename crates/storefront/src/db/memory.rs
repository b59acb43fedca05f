//! In-process storage backend.
//!
//! All state lives behind one async mutex. A checkout takes the mutex for
//! its whole lifetime and works on a copy of the state that replaces the
//! original on commit, so checkouts are fully serialized and an abandoned
//! transaction leaves no trace.
//!
//! Individual steps can be made to fail with [`FailPoint`] to exercise
//! rollback paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use bazaar_core::{
    Email, FulfillmentStatus, Money, OrderId, OrderLineId, PaymentStatus, ProductId, UserId,
    WebsiteId,
};

use super::{
    CartStore, CheckoutStore, CheckoutTransaction, IdentityStore, OrderStore, RepositoryError,
    StockUpdate, StorageHealth, UserStore,
};
use crate::models::{
    CartItem, CatalogProduct, Identity, LoginRecord, NewOrder, NewOrderLine, NewUser,
    OrderDetail, OrderFilter, OrderLine, OrderRecord, OrderSummary,
};

/// Checkout step that should fail with a database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    FindIdentity,
    InsertOrder,
    InsertOrderLine,
    DecrementStock,
    ClearCart,
    Commit,
}

#[derive(Debug, Clone)]
struct StoredLine {
    id: OrderLineId,
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    price: Money,
}

#[derive(Debug, Clone, Default)]
struct State {
    websites: BTreeMap<WebsiteId, String>,
    users: BTreeMap<UserId, LoginRecord>,
    products: BTreeMap<ProductId, CatalogProduct>,
    orders: BTreeMap<OrderId, OrderRecord>,
    lines: Vec<StoredLine>,
    cart: BTreeMap<(UserId, ProductId), i32>,
    fail_point: Option<FailPoint>,
}

impl State {
    fn next_order_id(&self) -> OrderId {
        OrderId::new(self.orders.keys().next_back().map_or(1, |id| id.as_i32() + 1))
    }

    fn next_user_id(&self) -> UserId {
        UserId::new(self.users.keys().next_back().map_or(1, |id| id.as_i32() + 1))
    }

    fn next_product_id(&self) -> ProductId {
        ProductId::new(self.products.keys().next_back().map_or(1, |id| id.as_i32() + 1))
    }

    fn next_line_id(&self) -> OrderLineId {
        OrderLineId::new(self.lines.last().map_or(1, |line| line.id.as_i32() + 1))
    }

    fn check(&self, step: FailPoint) -> Result<(), RepositoryError> {
        if self.fail_point == Some(step) {
            return Err(RepositoryError::Database(sqlx::Error::Protocol(format!(
                "injected failure at {step:?}"
            ))));
        }
        Ok(())
    }

    fn owner(&self, order: &OrderRecord) -> Option<(String, Email)> {
        let user = self.users.get(&order.user_id?)?;
        Some((user.identity.name.clone(), user.identity.email.clone()))
    }

    fn detail(&self, order: &OrderRecord) -> OrderDetail {
        let items = self
            .lines
            .iter()
            .filter(|line| line.order_id == order.id)
            .map(|line| {
                let product = self.products.get(&line.product_id);
                OrderLine {
                    id: line.id,
                    product_id: line.product_id,
                    product_name: product.map(|p| p.name.clone()).unwrap_or_default(),
                    image_url: product.and_then(|p| p.image_url.clone()),
                    quantity: line.quantity,
                    price: line.price,
                }
            })
            .collect();

        OrderDetail::new(order.clone(), self.owner(order), items)
    }

    fn website_order(&self, website_id: WebsiteId, id: OrderId) -> Option<&OrderRecord> {
        self.orders
            .get(&id)
            .filter(|order| order.website_id == website_id)
    }
}

/// Storage backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a website (tenant).
    pub async fn add_website(&self, id: WebsiteId, name: &str) {
        self.state.lock().await.websites.insert(id, name.to_owned());
    }

    /// Add a catalog product and return it with its assigned id.
    pub async fn add_product(
        &self,
        website_id: WebsiteId,
        name: &str,
        price: Money,
        stock: i32,
    ) -> CatalogProduct {
        let mut state = self.state.lock().await;
        let product = CatalogProduct {
            id: state.next_product_id(),
            website_id,
            name: name.to_owned(),
            image_url: None,
            price,
            stock,
        };
        state.products.insert(product.id, product.clone());
        product
    }

    /// Insert or replace a product under its own id.
    pub async fn put_product(&self, product: CatalogProduct) {
        self.state.lock().await.products.insert(product.id, product);
    }

    /// Insert or replace an account under its own id.
    pub async fn put_user(&self, identity: Identity, password_hash: &str) {
        let record = LoginRecord {
            identity,
            password_hash: password_hash.to_owned(),
        };
        self.state
            .lock()
            .await
            .users
            .insert(record.identity.id, record);
    }

    /// Saved cart of a user, regardless of website.
    pub async fn cart_of(&self, user_id: UserId) -> Vec<(ProductId, i32)> {
        self.state
            .lock()
            .await
            .cart
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|((_, product_id), quantity)| (*product_id, *quantity))
            .collect()
    }

    /// Current state of a product.
    pub async fn product(&self, id: ProductId) -> Option<CatalogProduct> {
        self.state.lock().await.products.get(&id).cloned()
    }

    /// Number of stored orders across all websites.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Number of stored order lines across all orders.
    pub async fn order_line_count(&self) -> usize {
        self.state.lock().await.lines.len()
    }

    /// Make a checkout step fail until cleared with `None`.
    pub async fn set_fail_point(&self, step: Option<FailPoint>) {
        self.state.lock().await.fail_point = step;
    }
}

/// A serialized in-memory checkout.
pub struct MemoryCheckout {
    guard: OwnedMutexGuard<State>,
    work: State,
}

#[async_trait]
impl CheckoutStore for MemoryStorage {
    async fn begin_checkout(&self) -> Result<Box<dyn CheckoutTransaction>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryCheckout { guard, work }))
    }
}

#[async_trait]
impl CheckoutTransaction for MemoryCheckout {
    async fn lock_product(
        &mut self,
        website_id: WebsiteId,
        product_id: ProductId,
    ) -> Result<Option<CatalogProduct>, RepositoryError> {
        Ok(self
            .work
            .products
            .get(&product_id)
            .filter(|p| p.website_id == website_id)
            .cloned())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderRecord, RepositoryError> {
        self.work.check(FailPoint::InsertOrder)?;

        let record = OrderRecord {
            id: self.work.next_order_id(),
            website_id: order.website_id,
            user_id: order.user_id,
            guest_name: order.guest_name.clone(),
            guest_email: order.guest_email.clone(),
            guest_phone: order.guest_phone.clone(),
            total_amount: order.total_amount,
            shipping_address: order.shipping_address.clone(),
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            status: order.status,
            created_at: Utc::now(),
        };
        self.work.orders.insert(record.id, record.clone());
        Ok(record)
    }

    async fn insert_order_line(
        &mut self,
        line: &NewOrderLine,
    ) -> Result<OrderLineId, RepositoryError> {
        self.work.check(FailPoint::InsertOrderLine)?;

        if !self.work.orders.contains_key(&line.order_id)
            || !self.work.products.contains_key(&line.product_id)
        {
            return Err(RepositoryError::DataCorruption(format!(
                "order line references missing order {} or product {}",
                line.order_id, line.product_id
            )));
        }

        let id = self.work.next_line_id();
        self.work.lines.push(StoredLine {
            id,
            order_id: line.order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            price: line.price,
        });
        Ok(id)
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<StockUpdate, RepositoryError> {
        self.work.check(FailPoint::DecrementStock)?;

        let Some(product) = self.work.products.get_mut(&product_id) else {
            return Ok(StockUpdate::Missing);
        };
        if product.stock < quantity {
            return Ok(StockUpdate::Insufficient);
        }
        product.stock -= quantity;
        Ok(StockUpdate::Applied)
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64, RepositoryError> {
        self.work.check(FailPoint::ClearCart)?;

        let before = self.work.cart.len();
        self.work.cart.retain(|(owner, _), _| *owner != user_id);
        Ok(u64::try_from(before - self.work.cart.len()).unwrap_or(u64::MAX))
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.work.check(FailPoint::Commit)?;

        let Self { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStorage {
    async fn find_identity(&self, id: UserId) -> Result<Option<Identity>, RepositoryError> {
        let state = self.state.lock().await;
        state.check(FailPoint::FindIdentity)?;
        Ok(state.users.get(&id).map(|u| u.identity.clone()))
    }
}

#[async_trait]
impl UserStore for MemoryStorage {
    async fn find_login(&self, email: &Email) -> Result<Option<LoginRecord>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.identity.email.matches(email.as_str()))
            .cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<Identity, RepositoryError> {
        let mut state = self.state.lock().await;
        if state
            .users
            .values()
            .any(|u| u.identity.email.matches(user.email.as_str()))
        {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let identity = Identity {
            id: state.next_user_id(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        };
        state.users.insert(
            identity.id,
            LoginRecord {
                identity: identity.clone(),
                password_hash: user.password_hash.clone(),
            },
        );
        Ok(identity)
    }
}

#[async_trait]
impl OrderStore for MemoryStorage {
    async fn list_orders(
        &self,
        filter: &OrderFilter,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        let state = self.state.lock().await;

        let mut orders: Vec<&OrderRecord> = state
            .orders
            .values()
            .filter(|o| o.website_id == filter.website_id)
            .filter(|o| filter.user_id.is_none() || o.user_id == filter.user_id)
            .collect();
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok(orders
            .into_iter()
            .map(|order| {
                let website_name = state
                    .websites
                    .get(&order.website_id)
                    .cloned()
                    .unwrap_or_default();
                OrderSummary::new(order.clone(), state.owner(order), website_name)
            })
            .collect())
    }

    async fn get_order(
        &self,
        website_id: WebsiteId,
        id: OrderId,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .website_order(website_id, id)
            .map(|order| state.detail(order)))
    }

    async fn find_for_tracking(
        &self,
        website_id: WebsiteId,
        id: OrderId,
        email: &Email,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let state = self.state.lock().await;
        let Some(order) = state.website_order(website_id, id) else {
            return Ok(None);
        };

        let guest_match = order
            .guest_email
            .as_ref()
            .is_some_and(|e| e.matches(email.as_str()));
        let owner_match = state
            .owner(order)
            .is_some_and(|(_, e)| e.matches(email.as_str()));

        Ok((guest_match || owner_match).then(|| state.detail(order)))
    }

    async fn transition_status(
        &self,
        website_id: WebsiteId,
        id: OrderId,
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        match state.orders.get_mut(&id) {
            Some(order) if order.website_id == website_id && order.status == from => {
                order.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_payment(
        &self,
        website_id: WebsiteId,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        match state.orders.get_mut(&id) {
            Some(order) if order.website_id == website_id && order.payment_status == from => {
                order.payment_status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CartStore for MemoryStorage {
    async fn cart_items(
        &self,
        website_id: WebsiteId,
        user_id: UserId,
    ) -> Result<Vec<CartItem>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .cart
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .filter_map(|((_, product_id), quantity)| {
                let product = state.products.get(product_id)?;
                (product.website_id == website_id).then(|| CartItem {
                    product_id: product.id,
                    name: product.name.clone(),
                    image_url: product.image_url.clone(),
                    price: product.price,
                    quantity: *quantity,
                })
            })
            .collect())
    }

    async fn upsert_cart_item(
        &self,
        website_id: WebsiteId,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let in_catalog = state
            .products
            .get(&product_id)
            .is_some_and(|p| p.website_id == website_id);
        if !in_catalog {
            return Err(RepositoryError::NotFound);
        }
        state.cart.insert((user_id, product_id), quantity);
        Ok(())
    }

    async fn remove_cart_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state.cart.remove(&(user_id, product_id)).is_some())
    }
}

#[async_trait]
impl StorageHealth for MemoryStorage {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
