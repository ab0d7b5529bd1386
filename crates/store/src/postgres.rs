use async_trait::async_trait;
use common::{CheckoutSessionId, OrderId, ProductId, UserId};
use domain::{CartLine, Money, Order, Product};
use sqlx::{
    PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};

use crate::{
    Result, StoreError,
    store::{CartStore, Catalog, OrderStore, StockDecrement, StockLedger},
};

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

    /// Opens a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
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

    /// Adds or replaces a catalog product and sets its stock.
    pub async fn upsert_product(&self, product: &Product, stock: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, title, price_minor, image_ref, sku, weight_grams, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                price_minor = EXCLUDED.price_minor,
                image_ref = EXCLUDED.image_ref,
                sku = EXCLUDED.sku,
                weight_grams = EXCLUDED.weight_grams,
                stock = EXCLUDED.stock,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.title)
        .bind(product.price.cents())
        .bind(&product.image_ref)
        .bind(&product.sku)
        .bind(i64::from(product.weight_grams))
        .bind(i64::from(stock))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Adds a line to a user's cart, replacing the quantity of an existing line.
    pub async fn add_to_cart(&self, user_id: UserId, line: &CartLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_lines (user_id, product_id, qty)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET qty = EXCLUDED.qty
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(line.product_id.as_str())
        .bind(i64::from(line.qty))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let document: serde_json::Value = row.try_get("document")?;
        let version: i64 = row.try_get("version")?;

        let mut order: Order = serde_json::from_value(document)?;
        order.set_version(u64::try_from(version).unwrap_or_default());
        Ok(order)
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let weight_grams: i64 = row.try_get("weight_grams")?;

        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            title: row.try_get("title")?,
            price: Money::from_cents(row.try_get("price_minor")?),
            image_ref: row.try_get("image_ref")?,
            sku: row.try_get("sku")?,
            weight_grams: u32::try_from(weight_grams).unwrap_or_default(),
        })
    }

    async fn current_version(&self, order_id: OrderId) -> Result<Option<u64>> {
        let version: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(version.map(|v| u64::try_from(v).unwrap_or_default()))
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn insert_order(&self, order: &Order) -> Result<Order> {
        let mut stored = order.clone();
        stored.set_version(1);
        let document = serde_json::to_value(&stored)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, owner_id, checkout_session_id, status, payment_status,
                                payment_reference, version, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(stored.id().as_uuid())
        .bind(stored.owner_id().as_uuid())
        .bind(stored.checkout_session_id().map(CheckoutSessionId::as_str))
        .bind(stored.status().as_str())
        .bind(stored.payment_status().as_str())
        .bind(stored.payment_reference())
        .bind(to_i64(stored.version()))
        .bind(document)
        .bind(stored.created_at())
        .bind(stored.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // A second order for the same checkout session
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_checkout_session")
                && let Some(session_id) = stored.checkout_session_id()
            {
                return StoreError::DuplicateCheckoutSession(session_id.clone());
            }
            StoreError::Database(e)
        })?;

        Ok(stored)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document, version FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_session(
        &self,
        owner_id: UserId,
        checkout_session_id: &CheckoutSessionId,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT document, version
            FROM orders
            WHERE checkout_session_id = $1 AND owner_id = $2
            "#,
        )
        .bind(checkout_session_id.as_str())
        .bind(owner_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), version = order.version()))]
    async fn update_order(&self, order: &Order) -> Result<Order> {
        let mut stored = order.clone();
        stored.set_version(order.version() + 1);
        let document = serde_json::to_value(&stored)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, payment_status = $2, payment_reference = $3,
                version = $4, document = $5, updated_at = $6
            WHERE id = $7 AND version = $8
            "#,
        )
        .bind(stored.status().as_str())
        .bind(stored.payment_status().as_str())
        .bind(stored.payment_reference())
        .bind(to_i64(stored.version()))
        .bind(document)
        .bind(stored.updated_at())
        .bind(order.id().as_uuid())
        .bind(to_i64(order.version()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.current_version(order.id()).await? {
                Some(actual) => Err(StoreError::ConcurrencyConflict {
                    order_id: order.id(),
                    expected: order.version(),
                    actual,
                }),
                None => Err(StoreError::OrderNotFound(order.id())),
            };
        }

        Ok(stored)
    }
}

#[async_trait]
impl StockLedger for PostgresStore {
    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<u32>> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(stock.map(|s| u32::try_from(s).unwrap_or_default()))
    }

    #[tracing::instrument(skip(self, product_id), fields(product_id = %product_id))]
    async fn decrement_stock(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        qty: u32,
    ) -> Result<StockDecrement> {
        let mut tx = self.pool.begin().await?;

        // Concurrent inserts for the same pair wait on the primary key
        let inserted = sqlx::query(
            r#"
            INSERT INTO stock_movements (order_id, product_id, qty)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_id, product_id) DO NOTHING
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(product_id.as_str())
        .bind(i64::from(qty))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(StockDecrement::AlreadyApplied);
        }

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = GREATEST(stock - $2, 0), updated_at = NOW()
            WHERE id = $1
            RETURNING stock
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(qty))
        .fetch_optional(&mut *tx)
        .await?;

        match remaining {
            Some(remaining) => {
                tx.commit().await?;
                Ok(StockDecrement::Applied {
                    remaining: u32::try_from(remaining).unwrap_or_default(),
                })
            }
            None => {
                tx.rollback().await?;
                Ok(StockDecrement::ProductMissing)
            }
        }
    }
}

#[async_trait]
impl Catalog for PostgresStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, price_minor, image_ref, sku, weight_grams
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, qty
            FROM cart_lines
            WHERE user_id = $1
            ORDER BY added_at ASC, product_id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<CartLine> {
                let product_id: String = row.try_get("product_id")?;
                let qty: i64 = row.try_get("qty")?;
                Ok(CartLine::new(product_id, u32::try_from(qty).unwrap_or_default()))
            })
            .collect()
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
