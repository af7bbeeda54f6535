use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookId, OrderId, PaymentId, UserId};
use domain::{Book, Money, Order, OrderLine, OrderStatus, Payment, PaymentStatus};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{
        ExpiredPayment, InventoryGuard, OrderFilter, OrderStore, PaymentStore, ReserveOutcome,
        Store, Transaction,
    },
};

const ORDER_COLUMNS: &str =
    "id, user_id, total_price, status, shipping_address, notes, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, order_id, total_price, currency, transaction_id, payment_method, \
     status, gateway_response, verified_at, expires_at, created_at, updated_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Adds a book to the catalog, or resets title, price and stock of an existing one.
    pub async fn insert_book(&self, book: &Book) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, title, price, stock)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title, price = EXCLUDED.price, stock = EXCLUDED.stock, updated_at = NOW()
            "#,
        )
        .bind(book.id.as_uuid())
        .bind(&book.title)
        .bind(book.price.amount())
        .bind(to_db_int(book.stock)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// Transaction over a [`PostgresStore`].
///
/// Reads made through `find_order`, `find_payment` and `find_payment_by_order`
/// take `FOR UPDATE` row locks, so a concurrent writer of the same row waits
/// for this transaction and then sees its result.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryGuard for PostgresTransaction {
    async fn find_book(&mut self, id: BookId) -> Result<Option<Book>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT id, title, price, stock FROM books WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        row.map(row_to_book).transpose()
    }

    async fn reserve(&mut self, id: BookId, quantity: u32) -> Result<ReserveOutcome> {
        let quantity = to_db_int(quantity)?;

        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE books SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(id.as_uuid())
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(ReserveOutcome::Reserved {
                remaining: from_db_int(remaining)?,
            });
        }

        let available: Option<i32> = sqlx::query_scalar("SELECT stock FROM books WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match available {
            Some(available) => {
                tracing::debug!(
                    book_id = %id,
                    available,
                    requested = quantity,
                    "reservation refused"
                );
                Ok(ReserveOutcome::InsufficientStock {
                    available: from_db_int(available)?,
                })
            }
            None => Err(StoreError::BookNotFound(id)),
        }
    }

    async fn release(&mut self, id: BookId, quantity: u32) -> Result<()> {
        let result =
            sqlx::query("UPDATE books SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(to_db_int(quantity)?)
                .execute(&mut *self.tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::BookNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresTransaction {
    async fn create_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_price, status, shipping_address, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.total_price.amount())
        .bind(order.status.as_str())
        .bind(&order.shipping_address)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for (line_no, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, book_id, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line_no as i32)
            .bind(line.book_id.as_uuid())
            .bind(to_db_int(line.quantity)?)
            .bind(line.unit_price.amount())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut lines = self.load_lines(&[id.as_uuid()]).await?;
        let lines = lines.remove(&id.as_uuid()).unwrap_or_default();
        row_to_order(row, lines).map(Some)
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = $2, shipping_address = $3, notes = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(&order.shipping_address)
        .bind(&order.notes)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order.id));
        }
        Ok(())
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if filter.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC");

        if filter.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id.as_uuid());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&mut *self.tx).await?;

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut lines = self.load_lines(&ids).await?;

        rows.into_iter()
            .zip(ids)
            .map(|(row, id)| row_to_order(row, lines.remove(&id).unwrap_or_default()))
            .collect()
    }
}

#[async_trait]
impl PaymentStore for PostgresTransaction {
    async fn create_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, total_price, currency, transaction_id, payment_method,
                                  status, gateway_response, verified_at, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.total_price.amount())
        .bind(&payment.currency)
        .bind(&payment.transaction_id)
        .bind(&payment.payment_method)
        .bind(payment.status.as_str())
        .bind(gateway_response_value(payment))
        .bind(payment.verified_at)
        .bind(payment.expires_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn find_payment_by_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                transaction_id = $2,
                payment_method = $3,
                status = $4,
                gateway_response = $5,
                verified_at = $6,
                expires_at = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(&payment.transaction_id)
        .bind(&payment.payment_method)
        .bind(payment.status.as_str())
        .bind(gateway_response_value(payment))
        .bind(payment.verified_at)
        .bind(payment.expires_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PaymentNotFound(payment.id));
        }
        Ok(())
    }

    async fn expired_pending_payments(
        &mut self,
        now: DateTime<Utc>,
        after: Option<ExpiredPayment>,
        limit: usize,
    ) -> Result<Vec<ExpiredPayment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, expires_at FROM payments
            WHERE status = $1 AND expires_at < $2
              AND ($3::timestamptz IS NULL OR (expires_at, id) > ($3, $4))
            ORDER BY expires_at ASC, id ASC
            LIMIT $5
            "#,
        )
        .bind(PaymentStatus::Pending.as_str())
        .bind(now)
        .bind(after.map(|cursor| cursor.expires_at))
        .bind(after.map(|cursor| cursor.payment_id.as_uuid()))
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ExpiredPayment {
                    payment_id: PaymentId::from_uuid(row.try_get("id")?),
                    order_id: OrderId::from_uuid(row.try_get("order_id")?),
                    expires_at: row.try_get("expires_at")?,
                })
            })
            .collect()
    }
}

impl PostgresTransaction {
    /// Loads the lines of the given orders, keyed by order id, in line order.
    async fn load_lines(&mut self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderLine>>> {
        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(lines);
        }

        let rows = sqlx::query(
            r#"
            SELECT order_id, book_id, quantity, price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            let line = OrderLine::new(
                BookId::from_uuid(row.try_get("book_id")?),
                from_db_int(row.try_get("quantity")?)?,
                Money::new(row.try_get("price")?),
            );
            lines.entry(order_id).or_default().push(line);
        }
        Ok(lines)
    }
}

fn row_to_book(row: PgRow) -> Result<Book> {
    Ok(Book {
        id: BookId::from_uuid(row.try_get("id")?),
        title: row.try_get("title")?,
        price: Money::new(row.try_get("price")?),
        stock: from_db_int(row.try_get("stock")?)?,
    })
}

fn row_to_order(row: PgRow, lines: Vec<OrderLine>) -> Result<Order> {
    let status: String = row.try_get("status")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        lines,
        total_price: Money::new(row.try_get("total_price")?),
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        shipping_address: row.try_get("shipping_address")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    let gateway_response = match row.try_get::<Option<serde_json::Value>, _>("gateway_response")? {
        None => None,
        Some(serde_json::Value::Object(map)) => Some(map),
        Some(other) => {
            return Err(StoreError::Decode(format!(
                "gateway_response is not an object: {other}"
            )));
        }
    };

    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        total_price: Money::new(row.try_get("total_price")?),
        currency: row.try_get("currency")?,
        transaction_id: row.try_get("transaction_id")?,
        payment_method: row.try_get("payment_method")?,
        status: status
            .parse::<PaymentStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        gateway_response,
        verified_at: row.try_get("verified_at")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn gateway_response_value(payment: &Payment) -> Option<serde_json::Value> {
    payment
        .gateway_response
        .clone()
        .map(serde_json::Value::Object)
}

fn to_db_int(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Decode(format!("{value} does not fit INTEGER")))
}

fn from_db_int(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("negative count {value}")))
}
