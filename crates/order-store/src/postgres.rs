use async_trait::async_trait;
use common::{CardId, FoodId, OrderId, RestaurantId, ShipperId, UserId};
use domain::{
    Audit, DeliveryAddress, FoodSnapshot, Money, Order, OrderAggregate, OrderDetail,
    OrderNotification, OrderTracking, Version,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use crate::{
    OrderPage, OrderQuery, OutboxMessage, OutboxStatus, Result, StoreError, store::OrderStore,
};

const ORDER_COLUMNS: &str = r#"
    o.id, o.user_id, o.total_price, o.shipper_id, o.status, o.saga_status, o.version,
    o.created_by, o.updated_by, o.created_at, o.updated_at,
    t.restaurant_id, t.state, t.cancellation_reason, t.payment_status, t.payment_method,
    t.card_id, t.delivery_address, t.delivery_fee, t.estimated_delivery_minutes,
    t.actual_delivery_minutes
"#;

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and brings the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: &PgRow) -> Result<(Order, OrderTracking)> {
        let id = OrderId::new(row.try_get::<String, _>("id")?);
        let status: String = row.try_get("status")?;
        let saga_status: String = row.try_get("saga_status")?;
        let state: String = row.try_get("state")?;
        let payment_status: String = row.try_get("payment_status")?;
        let payment_method: String = row.try_get("payment_method")?;
        let address: serde_json::Value = row.try_get("delivery_address")?;

        let order = Order {
            id: id.clone(),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            total_price: Money::from_cents(row.try_get("total_price")?),
            shipper_id: row
                .try_get::<Option<String>, _>("shipper_id")?
                .map(ShipperId::new),
            status: status.parse()?,
            saga_status: saga_status.parse()?,
            version: Version::new(row.try_get("version")?),
            audit: Audit {
                created_by: UserId::new(row.try_get::<String, _>("created_by")?),
                updated_by: UserId::new(row.try_get::<String, _>("updated_by")?),
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            },
        };

        let tracking = OrderTracking {
            order_id: id,
            restaurant_id: RestaurantId::new(row.try_get::<String, _>("restaurant_id")?),
            state: state.parse()?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            payment_status: payment_status.parse()?,
            payment_method: payment_method.parse()?,
            card_id: row.try_get::<Option<String>, _>("card_id")?.map(CardId::new),
            delivery_address: serde_json::from_value::<DeliveryAddress>(address)?,
            delivery_fee: Money::from_cents(row.try_get("delivery_fee")?),
            estimated_delivery_minutes: row.try_get("estimated_delivery_minutes")?,
            actual_delivery_minutes: row.try_get("actual_delivery_minutes")?,
        };

        Ok((order, tracking))
    }

    fn row_to_detail(row: &PgRow) -> Result<OrderDetail> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(OrderDetail {
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            food: FoodSnapshot {
                food_id: FoodId::new(row.try_get::<String, _>("food_id")?),
                name: row.try_get("food_name")?,
                description: row.try_get("food_description")?,
                image: row.try_get("food_image")?,
            },
            unit_price: Money::from_cents(row.try_get("unit_price")?),
            quantity: u32::try_from(quantity).unwrap_or_default(),
            discount: Money::from_cents(row.try_get("discount")?),
        })
    }

    fn row_to_outbox(row: &PgRow) -> Result<OutboxMessage> {
        let event: serde_json::Value = row.try_get("event")?;
        let status: String = row.try_get("status")?;
        let attempts: i32 = row.try_get("attempts")?;

        Ok(OutboxMessage {
            id: row.try_get("id")?,
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            event: serde_json::from_value::<OrderNotification>(event)?,
            status: status.parse().map_err(StoreError::CorruptOutbox)?,
            attempts: u32::try_from(attempts).unwrap_or_default(),
            last_error: row.try_get("last_error")?,
            delivered_to: row.try_get("delivered_to")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn insert_outbox(
        tx: &mut Transaction<'_, Postgres>,
        messages: &[OutboxMessage],
    ) -> Result<()> {
        for message in messages {
            sqlx::query(
                r#"
                INSERT INTO order_outbox
                    (id, order_id, event, status, attempts, last_error, delivered_to, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(message.id)
            .bind(message.order_id.as_str())
            .bind(serde_json::to_value(&message.event)?)
            .bind(message.status.as_str())
            .bind(message.attempts as i32)
            .bind(&message.last_error)
            .bind(&message.delivered_to)
            .bind(message.created_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Maps a zero-row versioned update onto `NotFound` or `ConcurrencyConflict`.
    async fn version_mismatch(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &OrderId,
        expected: Version,
    ) -> StoreError {
        let actual: std::result::Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(order_id.as_str())
                .fetch_optional(&mut **tx)
                .await;

        match actual {
            Ok(Some(actual)) => StoreError::ConcurrencyConflict {
                order_id: order_id.clone(),
                expected,
                actual: Version::new(actual),
            },
            Ok(None) => StoreError::NotFound(order_id.clone()),
            Err(e) => StoreError::Database(e),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &OrderQuery) {
        builder.push(" WHERE 1=1");
        if !query.include_deleted {
            builder.push(" AND o.status = 'active'");
        }
        if let Some(user_id) = &query.user_id {
            builder.push(" AND o.user_id = ").push_bind(user_id.to_string());
        }
        if let Some(restaurant_id) = &query.restaurant_id {
            builder
                .push(" AND t.restaurant_id = ")
                .push_bind(restaurant_id.to_string());
        }
        if let Some(shipper_id) = &query.shipper_id {
            builder
                .push(" AND o.shipper_id = ")
                .push_bind(shipper_id.to_string());
        }
        if let Some(state) = query.state {
            builder.push(" AND t.state = ").push_bind(state.as_str());
        }
        if let Some(statuses) = &query.saga_statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            builder
                .push(" AND o.saga_status = ANY(")
                .push_bind(statuses)
                .push(")");
        }
        if let Some(before) = query.created_before {
            builder.push(" AND o.created_at < ").push_bind(before);
        }
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, order_id: &OrderId) -> Result<Option<OrderAggregate>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o JOIN order_trackings t ON t.order_id = o.id WHERE o.id = $1"
        ))
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let (order, tracking) = Self::row_to_order(&row)?;

        let detail_rows = sqlx::query(
            r#"
            SELECT order_id, food_id, food_name, food_description, food_image,
                   unit_price, quantity, discount
            FROM order_details
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let details = detail_rows
            .iter()
            .map(Self::row_to_detail)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(OrderAggregate {
            order,
            tracking,
            details,
        }))
    }

    #[tracing::instrument(skip(self, aggregate, outbox), fields(order_id = %aggregate.id()))]
    async fn insert(&self, aggregate: &OrderAggregate, outbox: Vec<OutboxMessage>) -> Result<()> {
        let order = &aggregate.order;
        let tracking = &aggregate.tracking;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_price, shipper_id, status, saga_status, version,
                                created_by, updated_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.user_id.as_str())
        .bind(order.total_price.cents())
        .bind(order.shipper_id.as_ref().map(|s| s.to_string()))
        .bind(order.status.as_str())
        .bind(order.saga_status.as_str())
        .bind(Version::first().as_i64())
        .bind(order.audit.created_by.as_str())
        .bind(order.audit.updated_by.as_str())
        .bind(order.audit.created_at)
        .bind(order.audit.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists(order.id.clone());
            }
            StoreError::Database(e)
        })?;

        sqlx::query(
            r#"
            INSERT INTO order_trackings (order_id, restaurant_id, state, cancellation_reason,
                                         payment_status, payment_method, card_id, delivery_address,
                                         delivery_fee, estimated_delivery_minutes, actual_delivery_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id.as_str())
        .bind(tracking.restaurant_id.as_str())
        .bind(tracking.state.as_str())
        .bind(&tracking.cancellation_reason)
        .bind(tracking.payment_status.as_str())
        .bind(tracking.payment_method.as_str())
        .bind(tracking.card_id.as_ref().map(|c| c.to_string()))
        .bind(serde_json::to_value(&tracking.delivery_address)?)
        .bind(tracking.delivery_fee.cents())
        .bind(tracking.estimated_delivery_minutes)
        .bind(tracking.actual_delivery_minutes)
        .execute(&mut *tx)
        .await?;

        for detail in &aggregate.details {
            sqlx::query(
                r#"
                INSERT INTO order_details (order_id, food_id, food_name, food_description, food_image,
                                           unit_price, quantity, discount)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.id.as_str())
            .bind(detail.food.food_id.as_str())
            .bind(&detail.food.name)
            .bind(&detail.food.description)
            .bind(&detail.food.image)
            .bind(detail.unit_price.cents())
            .bind(detail.quantity as i32)
            .bind(detail.discount.cents())
            .execute(&mut *tx)
            .await?;
        }

        Self::insert_outbox(&mut tx, &outbox).await?;

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, order, tracking, outbox), fields(order_id = %order.id))]
    async fn update(
        &self,
        order: &Order,
        tracking: &OrderTracking,
        expected_version: Version,
        outbox: Vec<OutboxMessage>,
    ) -> Result<Version> {
        let new_version = expected_version.next();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET shipper_id = $3, status = $4, saga_status = $5, updated_by = $6,
                updated_at = $7, version = $8
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id.as_str())
        .bind(expected_version.as_i64())
        .bind(order.shipper_id.as_ref().map(|s| s.to_string()))
        .bind(order.status.as_str())
        .bind(order.saga_status.as_str())
        .bind(order.audit.updated_by.as_str())
        .bind(order.audit.updated_at)
        .bind(new_version.as_i64())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Self::version_mismatch(&mut tx, &order.id, expected_version).await);
        }

        sqlx::query(
            r#"
            UPDATE order_trackings
            SET state = $2, cancellation_reason = $3, payment_status = $4, payment_method = $5,
                card_id = $6, delivery_address = $7, delivery_fee = $8,
                estimated_delivery_minutes = $9, actual_delivery_minutes = $10
            WHERE order_id = $1
            "#,
        )
        .bind(order.id.as_str())
        .bind(tracking.state.as_str())
        .bind(&tracking.cancellation_reason)
        .bind(tracking.payment_status.as_str())
        .bind(tracking.payment_method.as_str())
        .bind(tracking.card_id.as_ref().map(|c| c.to_string()))
        .bind(serde_json::to_value(&tracking.delivery_address)?)
        .bind(tracking.delivery_fee.cents())
        .bind(tracking.estimated_delivery_minutes)
        .bind(tracking.actual_delivery_minutes)
        .execute(&mut *tx)
        .await?;

        Self::insert_outbox(&mut tx, &outbox).await?;

        tx.commit().await?;
        Ok(new_version)
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn soft_delete(&self, order: &Order, expected_version: Version) -> Result<Version> {
        let new_version = expected_version.next();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'deleted', updated_by = $3, updated_at = $4, version = $5
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id.as_str())
        .bind(expected_version.as_i64())
        .bind(order.audit.updated_by.as_str())
        .bind(order.audit.updated_at)
        .bind(new_version.as_i64())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Self::version_mismatch(&mut tx, &order.id, expected_version).await);
        }

        tx.commit().await?;
        Ok(new_version)
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, query: OrderQuery) -> Result<OrderPage> {
        let (limit, offset) = query.page_bounds()?;

        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM orders o JOIN order_trackings t ON t.order_id = o.id",
        );
        Self::push_filters(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ORDER_COLUMNS} FROM orders o JOIN order_trackings t ON t.order_id = o.id"
        ));
        Self::push_filters(&mut select, &query);
        select
            .push(" ORDER BY o.created_at DESC, o.id ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(&self.pool).await?;

        let mut page = OrderPage {
            total: total as u64,
            ..OrderPage::default()
        };
        for row in &rows {
            let (order, tracking) = Self::row_to_order(row)?;
            page.orders.push(order);
            page.trackings.push(tracking);
        }
        Ok(page)
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, event, status, attempts, last_error, delivered_to, created_at
            FROM order_outbox
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_outbox).collect()
    }

    async fn pending_outbox_for_order(&self, order_id: &OrderId) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, event, status, attempts, last_error, delivered_to, created_at
            FROM order_outbox
            WHERE status = 'pending' AND order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_outbox).collect()
    }

    async fn mark_outbox_delivered(&self, message_id: Uuid) -> Result<()> {
        let updated = sqlx::query("UPDATE order_outbox SET status = 'delivered' WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::OutboxMessageNotFound(message_id));
        }
        Ok(())
    }

    async fn mark_outbox_failed(
        &self,
        message_id: Uuid,
        error: &str,
        delivered_to: &[String],
        max_attempts: u32,
    ) -> Result<OutboxStatus> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE order_outbox
            SET attempts = attempts + 1,
                last_error = $2,
                delivered_to = ARRAY(
                    SELECT DISTINCT audience FROM unnest(delivered_to || $4::text[]) AS audience
                ),
                status = CASE WHEN attempts + 1 >= $3 THEN 'failed' ELSE status END
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(message_id)
        .bind(error)
        .bind(max_attempts as i32)
        .bind(delivered_to.to_vec())
        .fetch_optional(&self.pool)
        .await?;

        let status = status.ok_or(StoreError::OutboxMessageNotFound(message_id))?;
        status.parse().map_err(StoreError::CorruptOutbox)
    }
}
