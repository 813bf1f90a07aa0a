//! PostgreSQL order store
//!
//! Four normalized tables: `delivery`, `payment`, `orders`, `item`.
//! `orders` references its delivery and payment rows by surrogate key;
//! `item` rows reference `orders.order_uid` directly.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{Delivery, Item, Order, Payment};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::OrderStore;
use crate::error::{OrderError, OrderResult};

const ORDER_SELECT: &str = r#"
    SELECT o.order_uid, o.track_number, o.entry,
           o.locale, o.internal_signature, o.customer_id,
           o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
           d.name, d.phone, d.zip, d.city, d.address, d.region, d.email,
           p.transaction, p.request_id, p.currency, p.provider, p.amount, p.payment_dt,
           p.bank, p.delivery_cost, p.goods_total, p.custom_fee
    FROM orders o
    JOIN delivery d ON o.delivery_id = d.id
    JOIN payment p ON o.payment_id = p.id
"#;

const ITEM_COLUMNS: &str = "order_uid, chrt_id, track_number, price, rid, name, sale, size, \
                            total_price, nm_id, brand, status";

/// Joined `orders` + `delivery` + `payment` row
#[derive(sqlx::FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
    #[sqlx(flatten)]
    delivery: Delivery,
    #[sqlx(flatten)]
    payment: Payment,
}

impl OrderRow {
    fn into_order(self, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: self.delivery,
            payment: self.payment,
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_uid: String,
    #[sqlx(flatten)]
    item: Item,
}

/// Classify a write failure.
///
/// Unique violation: the order is already stored. SQLSTATE class 22 (data
/// exception) and 23 (integrity constraint): the payload itself is refused
/// and will be refused again. Everything else may succeed on retry.
fn classify_write_error(e: sqlx::Error, order_uid: &str) -> OrderError {
    let permanent = match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            return OrderError::Duplicate(order_uid.to_string());
        }
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| is_permanent_sqlstate(&code)),
        _ => false,
    };
    if permanent {
        OrderError::Rejected(e.into())
    } else {
        OrderError::from(e)
    }
}

fn is_permanent_sqlstate(code: &str) -> bool {
    code.starts_with("22") || code.starts_with("23")
}

/// Order store backed by a shared PostgreSQL pool
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool and apply pending migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> OrderResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(OrderError::store)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn save_order(&self, order: &Order) -> OrderResult<()> {
        let uid = order.order_uid.as_str();
        // Dropping `tx` on any early return rolls back every insert below
        let mut tx = self.pool.begin().await?;

        let (delivery_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO delivery (name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&order.delivery.name)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.zip)
        .bind(&order.delivery.city)
        .bind(&order.delivery.address)
        .bind(&order.delivery.region)
        .bind(&order.delivery.email)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify_write_error(e, uid))?;

        let (payment_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO payment (transaction, request_id, currency, provider, amount, payment_dt,
                                 bank, delivery_cost, goods_total, custom_fee)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(&order.payment.transaction)
        .bind(&order.payment.request_id)
        .bind(&order.payment.currency)
        .bind(&order.payment.provider)
        .bind(order.payment.amount)
        .bind(order.payment.payment_dt)
        .bind(&order.payment.bank)
        .bind(order.payment.delivery_cost)
        .bind(order.payment.goods_total)
        .bind(order.payment.custom_fee)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify_write_error(e, uid))?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_uid, track_number, entry, delivery_id, payment_id, locale,
                                internal_signature, customer_id, delivery_service, shardkey,
                                sm_id, date_created, oof_shard)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(delivery_id)
        .bind(payment_id)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_write_error(e, uid))?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO item (order_uid, chrt_id, track_number, price, rid, name, sale, size,
                                  total_price, nm_id, brand, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(&order.order_uid)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_write_error(e, uid))?;
        }

        tx.commit()
            .await
            .map_err(|e| classify_write_error(e, uid))?;

        tracing::debug!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "Order committed"
        );
        Ok(())
    }

    async fn get_order_by_id(&self, order_uid: &str) -> OrderResult<Option<Order>> {
        let query = format!("{ORDER_SELECT} WHERE o.order_uid = $1");
        let Some(row) = sqlx::query_as::<_, OrderRow>(&query)
            .bind(order_uid)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let items_query = format!("SELECT {ITEM_COLUMNS} FROM item WHERE order_uid = $1 ORDER BY id");
        let items: Vec<ItemRow> = sqlx::query_as(&items_query)
            .bind(order_uid)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(
            row.into_order(items.into_iter().map(|r| r.item).collect()),
        ))
    }

    async fn restore_cache(&self) -> OrderResult<Vec<Order>> {
        // One snapshot for both reads so items always match their orders
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let rows: Vec<OrderRow> = sqlx::query_as(ORDER_SELECT).fetch_all(&mut *tx).await?;

        let items_query = format!("SELECT {ITEM_COLUMNS} FROM item ORDER BY order_uid, id");
        let item_rows: Vec<ItemRow> = sqlx::query_as(&items_query).fetch_all(&mut *tx).await?;

        tx.commit().await?;

        let mut items_by_order: HashMap<String, Vec<Item>> = HashMap::new();
        for row in item_rows {
            items_by_order.entry(row.order_uid).or_default().push(row.item);
        }

        let orders: Vec<Order> = rows
            .into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.order_uid).unwrap_or_default();
                row.into_order(items)
            })
            .collect();

        tracing::debug!(count = orders.len(), "Loaded orders for cache restore");
        Ok(orders)
    }
}
