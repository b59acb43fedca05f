//! Checkout transactions for `PostgreSQL`.
//!
//! Products are locked with `SELECT ... FOR UPDATE`, so two checkouts that
//! touch the same product run one after the other. Callers lock in
//! ascending product id order, which keeps the lock graph acyclic.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use bazaar_core::{OrderLineId, ProductId, UserId, WebsiteId};

use super::{CheckoutStore, CheckoutTransaction, PgStorage, RepositoryError, StockUpdate};
use crate::models::{CatalogProduct, NewOrder, NewOrderLine, OrderRecord};

/// An open `PostgreSQL` transaction for one checkout.
///
/// sqlx rolls the transaction back when it is dropped uncommitted.
pub struct PgCheckout {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CheckoutStore for PgStorage {
    async fn begin_checkout(&self) -> Result<Box<dyn CheckoutTransaction>, RepositoryError> {
        let tx = self.pool().begin().await?;
        Ok(Box::new(PgCheckout { tx }))
    }
}

#[async_trait]
impl CheckoutTransaction for PgCheckout {
    async fn lock_product(
        &mut self,
        website_id: WebsiteId,
        product_id: ProductId,
    ) -> Result<Option<CatalogProduct>, RepositoryError> {
        let product = sqlx::query_as::<_, CatalogProduct>(
            r"
            SELECT id, website_id, name, image_url, price, stock
            FROM products
            WHERE id = $1 AND website_id = $2
            FOR UPDATE
            ",
        )
        .bind(product_id)
        .bind(website_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(product)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderRecord, RepositoryError> {
        let record = sqlx::query_as::<_, OrderRecord>(
            r"
            INSERT INTO orders (
                website_id, user_id, guest_name, guest_email, guest_phone,
                total_amount, shipping_address, payment_method, payment_status, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, website_id, user_id, guest_name, guest_email, guest_phone,
                      total_amount, shipping_address, payment_method, payment_status,
                      status, created_at
            ",
        )
        .bind(order.website_id)
        .bind(order.user_id)
        .bind(&order.guest_name)
        .bind(&order.guest_email)
        .bind(&order.guest_phone)
        .bind(order.total_amount)
        .bind(&order.shipping_address)
        .bind(order.payment_method)
        .bind(order.payment_status)
        .bind(order.status)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn insert_order_line(
        &mut self,
        line: &NewOrderLine,
    ) -> Result<OrderLineId, RepositoryError> {
        let id: OrderLineId = sqlx::query_scalar(
            r"
            INSERT INTO order_items (order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(line.order_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.price)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<StockUpdate, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE products
            SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            ",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(StockUpdate::Applied);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(if exists {
            StockUpdate::Insufficient
        } else {
            StockUpdate::Missing
        })
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
