//! Order queries for `PostgreSQL`.

use async_trait::async_trait;
use sqlx::PgConnection;

use bazaar_core::{Email, FulfillmentStatus, OrderId, PaymentStatus, WebsiteId};

use super::{OrderStore, PgStorage, RepositoryError};
use crate::models::{OrderDetail, OrderFilter, OrderLine, OrderRecord, OrderSummary};

/// Order header joined with its owner and website.
#[derive(sqlx::FromRow)]
struct OrderRow {
    #[sqlx(flatten)]
    order: OrderRecord,
    owner_name: Option<String>,
    owner_email: Option<Email>,
    website_name: String,
}

impl OrderRow {
    fn owner(&mut self) -> Option<(String, Email)> {
        self.owner_name.take().zip(self.owner_email.take())
    }
}

const ORDER_SELECT: &str = r"
    SELECT o.id, o.website_id, o.user_id, o.guest_name, o.guest_email, o.guest_phone,
           o.total_amount, o.shipping_address, o.payment_method, o.payment_status,
           o.status, o.created_at,
           u.name AS owner_name, u.email AS owner_email,
           w.name AS website_name
    FROM orders o
    LEFT JOIN users u ON u.id = o.user_id
    JOIN websites w ON w.id = o.website_id
";

async fn order_lines(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Vec<OrderLine>, RepositoryError> {
    let lines = sqlx::query_as::<_, OrderLine>(
        r"
        SELECT i.id, i.product_id, p.name AS product_name, p.image_url, i.quantity, i.price
        FROM order_items i
        JOIN products p ON p.id = i.product_id
        WHERE i.order_id = $1
        ORDER BY i.id
        ",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;

    Ok(lines)
}

impl PgStorage {
    async fn order_detail(
        &self,
        row: Option<OrderRow>,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let Some(mut row) = row else {
            return Ok(None);
        };

        let mut conn = self.pool().acquire().await?;
        let items = order_lines(&mut conn, row.order.id).await?;
        let owner = row.owner();

        Ok(Some(OrderDetail::new(row.order, owner, items)))
    }
}

#[async_trait]
impl OrderStore for PgStorage {
    async fn list_orders(
        &self,
        filter: &OrderFilter,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        let sql = format!(
            "{ORDER_SELECT}
            WHERE o.website_id = $1 AND ($2::int IS NULL OR o.user_id = $2)
            ORDER BY o.created_at DESC, o.id DESC"
        );

        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(filter.website_id)
            .bind(filter.user_id)
            .fetch_all(self.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(|mut row| {
                let owner = row.owner();
                OrderSummary::new(row.order, owner, row.website_name)
            })
            .collect())
    }

    async fn get_order(
        &self,
        website_id: WebsiteId,
        id: OrderId,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let sql = format!("{ORDER_SELECT} WHERE o.id = $1 AND o.website_id = $2");

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(website_id)
            .fetch_optional(self.pool())
            .await?;

        self.order_detail(row).await
    }

    async fn find_for_tracking(
        &self,
        website_id: WebsiteId,
        id: OrderId,
        email: &Email,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let sql = format!(
            "{ORDER_SELECT}
            WHERE o.id = $1 AND o.website_id = $2
              AND (lower(o.guest_email) = lower($3) OR lower(u.email) = lower($3))"
        );

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(website_id)
            .bind(email)
            .fetch_optional(self.pool())
            .await?;

        self.order_detail(row).await
    }

    async fn transition_status(
        &self,
        website_id: WebsiteId,
        id: OrderId,
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $4
            WHERE id = $1 AND website_id = $2 AND status = $3
            ",
        )
        .bind(id)
        .bind(website_id)
        .bind(from)
        .bind(to)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition_payment(
        &self,
        website_id: WebsiteId,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET payment_status = $4
            WHERE id = $1 AND website_id = $2 AND payment_status = $3
            ",
        )
        .bind(id)
        .bind(website_id)
        .bind(from)
        .bind(to)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

