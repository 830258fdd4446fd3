//! Transaction and goal persistence
//!
//! Backs the budget analyzer. In-memory for development and tests,
//! Postgres when `DATABASE_URL` is configured.

use crate::error::OrchestrationError;
use crate::models::{GoalTarget, Transaction};
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::info;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn add_transaction(&self, transaction: Transaction) -> Result<()>;
    /// All transactions, or only those in `month` (`YYYY-MM`), ordered by date
    async fn transactions(&self, month: Option<&str>) -> Result<Vec<Transaction>>;
    async fn add_goal(&self, goal: GoalTarget) -> Result<()>;
    async fn goals(&self) -> Result<Vec<GoalTarget>>;
}

/// In-memory store for development
#[derive(Default)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<Vec<Transaction>>>,
    goals: Arc<RwLock<Vec<GoalTarget>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transactions(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions: Arc::new(RwLock::new(transactions)),
            goals: Arc::default(),
        }
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn add_transaction(&self, transaction: Transaction) -> Result<()> {
        self.transactions.write().await.push(transaction);
        Ok(())
    }

    async fn transactions(&self, month: Option<&str>) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut selected: Vec<Transaction> = transactions
            .iter()
            .filter(|t| month.map_or(true, |m| t.month() == m))
            .cloned()
            .collect();
        selected.sort_by_key(|t| t.date);
        Ok(selected)
    }

    async fn add_goal(&self, goal: GoalTarget) -> Result<()> {
        self.goals.write().await.push(goal);
        Ok(())
    }

    async fn goals(&self) -> Result<Vec<GoalTarget>> {
        Ok(self.goals.read().await.clone())
    }
}

/// Postgres-backed store; schema is created on first use
pub struct PgTransactionStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

    /// Lazily connecting pool; no I/O until the first query
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)?;
        info!("Transaction store backend: postgres");
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS transactions (
                      id BIGSERIAL PRIMARY KEY,
                      date DATE NOT NULL,
                      amount DOUBLE PRECISION NOT NULL,
                      category TEXT NOT NULL,
                      description TEXT NOT NULL DEFAULT ''
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS investment_goals (
                      id BIGSERIAL PRIMARY KEY,
                      goal_name TEXT NOT NULL,
                      target_amount DOUBLE PRECISION NOT NULL,
                      time_frame INTEGER NOT NULL,
                      priority INTEGER
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::Database(format!(
                    "Failed to initialize transaction schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

fn db_error(context: &str, e: sqlx::Error) -> OrchestrationError {
    OrchestrationError::Database(format!("{}: {}", context, e))
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn add_transaction(&self, transaction: Transaction) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            "INSERT INTO transactions (date, amount, category, description) VALUES ($1, $2, $3, $4)",
        )
        .bind(transaction.date)
        .bind(transaction.amount)
        .bind(&transaction.category)
        .bind(&transaction.description)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert transaction", e))?;

        Ok(())
    }

    async fn transactions(&self, month: Option<&str>) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT date, amount, category, description
            FROM transactions
            WHERE $1::TEXT IS NULL OR to_char(date, 'YYYY-MM') = $1
            ORDER BY date ASC, id ASC
            "#,
        )
        .bind(month)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load transactions", e))?;

        rows.into_iter()
            .map(|row| -> Result<Transaction> {
                Ok(Transaction {
                    date: row.try_get("date")?,
                    amount: row.try_get("amount")?,
                    category: row.try_get("category")?,
                    description: row.try_get("description").unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn add_goal(&self, goal: GoalTarget) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            "INSERT INTO investment_goals (goal_name, target_amount, time_frame, priority) VALUES ($1, $2, $3, $4)",
        )
        .bind(&goal.description)
        .bind(goal.target)
        .bind(goal.years as i32)
        .bind(goal.priority.map(i32::from))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert goal", e))?;

        Ok(())
    }

    async fn goals(&self) -> Result<Vec<GoalTarget>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT goal_name, target_amount, time_frame, priority FROM investment_goals ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load goals", e))?;

        rows.into_iter()
            .map(|row| -> Result<GoalTarget> {
                let years: i32 = row.try_get("time_frame")?;
                let priority: Option<i32> = row.try_get("priority")?;
                Ok(GoalTarget {
                    description: row.try_get("goal_name")?,
                    target: row.try_get("target_amount")?,
                    years: years.max(0) as u32,
                    priority: priority.and_then(|p| u8::try_from(p).ok()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(y: i32, m: u32, d: u32, amount: f64, category: &str) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            amount,
            category: category.to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_month_filter_and_ordering() {
        let store = InMemoryTransactionStore::new();
        store.add_transaction(tx(2024, 2, 3, 40.0, "Dining")).await.unwrap();
        store.add_transaction(tx(2024, 1, 20, 15.0, "Transport")).await.unwrap();
        store.add_transaction(tx(2024, 1, 5, 60.0, "Dining")).await.unwrap();

        let january = store.transactions(Some("2024-01")).await.unwrap();
        assert_eq!(january.len(), 2);
        assert_eq!(january[0].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());

        let all = tokio_test::assert_ok!(store.transactions(None).await);
        assert_eq!(all.len(), 3);
        assert!(store.transactions(Some("2023-12")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_goals_round_trip_in_insertion_order() {
        let store = InMemoryTransactionStore::new();
        for (name, target) in [("Car", 20_000.0), ("House", 90_000.0)] {
            store
                .add_goal(GoalTarget {
                    description: name.to_string(),
                    target,
                    years: 4,
                    priority: None,
                })
                .await
                .unwrap();
        }

        let goals = store.goals().await.unwrap();
        assert_eq!(goals[0].description, "Car");
        assert_eq!(goals[1].target, 90_000.0);
    }
}
