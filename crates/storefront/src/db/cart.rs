//! Saved cart queries for `PostgreSQL`.

use async_trait::async_trait;

use bazaar_core::{ProductId, UserId, WebsiteId};

use super::{CartStore, PgStorage, RepositoryError};
use crate::models::CartItem;

#[async_trait]
impl CartStore for PgStorage {
    async fn cart_items(
        &self,
        website_id: WebsiteId,
        user_id: UserId,
    ) -> Result<Vec<CartItem>, RepositoryError> {
        let items = sqlx::query_as::<_, CartItem>(
            r"
            SELECT c.product_id, p.name, p.image_url, p.price, c.quantity
            FROM cart c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = $1 AND p.website_id = $2
            ORDER BY c.id
            ",
        )
        .bind(user_id)
        .bind(website_id)
        .fetch_all(self.pool())
        .await?;

        Ok(items)
    }

    async fn upsert_cart_item(
        &self,
        website_id: WebsiteId,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        // The SELECT yields no row for foreign or unknown products, so
        // nothing is inserted.
        let result = sqlx::query(
            r"
            INSERT INTO cart (user_id, product_id, quantity)
            SELECT $1, p.id, $3
            FROM products p
            WHERE p.id = $2 AND p.website_id = $4
            ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .bind(website_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn remove_cart_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
