use anyhow::Result;
use async_trait::async_trait;
use common::{ArbitrageOpportunity, Prediction, Uuid};
use sqlx::postgres::PgPool;
use tracing::info;

use super::PersistenceSink;

/// PostgreSQL store for opportunities and predictions
pub struct TimeSeriesDB {
    pool: PgPool,
}

impl TimeSeriesDB {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;

        info!("✅ Connected to PostgreSQL");

        Ok(Self { pool })
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS arbitrage_opportunities (
                time TIMESTAMPTZ NOT NULL,
                symbol TEXT NOT NULL,
                venue_a_price DOUBLE PRECISION NOT NULL,
                venue_b_price DOUBLE PRECISION NOT NULL,
                profit_percentage DOUBLE PRECISION NOT NULL,
                estimated_profit DOUBLE PRECISION NOT NULL,
                fee_venue_a DOUBLE PRECISION NOT NULL,
                fee_venue_b DOUBLE PRECISION NOT NULL,
                fee_network DOUBLE PRECISION NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS arbitrage_opportunities_symbol_time \
             ON arbitrage_opportunities (symbol, time DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id UUID PRIMARY KEY,
                time TIMESTAMPTZ NOT NULL,
                symbol TEXT NOT NULL,
                predicted_direction BOOLEAN NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                current_price DOUBLE PRECISION NOT NULL,
                returns DOUBLE PRECISION NOT NULL,
                volatility DOUBLE PRECISION NOT NULL,
                ma7 DOUBLE PRECISION NOT NULL,
                ma25 DOUBLE PRECISION NOT NULL,
                rsi DOUBLE PRECISION NOT NULL,
                model_version TEXT NOT NULL,
                actual_direction BOOLEAN,
                backtest_accuracy DOUBLE PRECISION,
                backtest_pnl DOUBLE PRECISION
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for column in ["backtest_accuracy", "backtest_pnl"] {
            sqlx::query(&format!(
                "ALTER TABLE predictions ADD COLUMN IF NOT EXISTS {} DOUBLE PRECISION",
                column
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS predictions_symbol_time ON predictions (symbol, time DESC)",
        )
        .execute(&self.pool)
        .await?;

        info!("✅ Initialized opportunity and prediction tables");

        Ok(())
    }

    pub async fn set_actual_direction(&self, id: Uuid, actual: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE predictions SET actual_direction = $1 WHERE id = $2")
            .bind(actual)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PersistenceSink for TimeSeriesDB {
    async fn record_opportunity(&self, opp: &ArbitrageOpportunity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO arbitrage_opportunities (
                time, symbol, venue_a_price, venue_b_price, profit_percentage,
                estimated_profit, fee_venue_a, fee_venue_b, fee_network
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(opp.timestamp)
        .bind(&opp.symbol)
        .bind(opp.venue_a_price)
        .bind(opp.venue_b_price)
        .bind(opp.profit_percentage)
        .bind(opp.estimated_profit)
        .bind(opp.fee_breakdown.venue_a)
        .bind(opp.fee_breakdown.venue_b)
        .bind(opp.fee_breakdown.network)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_prediction(&self, prediction: &Prediction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions (
                id, time, symbol, predicted_direction, confidence, current_price,
                returns, volatility, ma7, ma25, rsi, model_version, actual_direction,
                backtest_accuracy, backtest_pnl
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(prediction.id)
        .bind(prediction.timestamp)
        .bind(&prediction.symbol)
        .bind(prediction.predicted_direction)
        .bind(prediction.confidence)
        .bind(prediction.current_price)
        .bind(prediction.metrics.returns)
        .bind(prediction.metrics.volatility)
        .bind(prediction.metrics.ma7)
        .bind(prediction.metrics.ma25)
        .bind(prediction.metrics.rsi)
        .bind(&prediction.model_version)
        .bind(prediction.actual_direction)
        .bind(prediction.backtest.map(|b| b.accuracy))
        .bind(prediction.backtest.map(|b| b.pnl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
