use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use crate::{models::audit::DeliveryRecord, services::recorder::DeliverySink};

const CREATE_DELIVERY_LOGS: &str = r#"
    CREATE TABLE IF NOT EXISTS delivery_logs (
        id BIGSERIAL PRIMARY KEY,
        event_id UUID NOT NULL,
        recipient_id TEXT NOT NULL,
        event_kind TEXT NOT NULL,
        template_id TEXT NOT NULL,
        channel TEXT NOT NULL,
        status TEXT NOT NULL,
        provider_message_id TEXT,
        error_code TEXT,
        error_message TEXT,
        attempted_at TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS delivery_logs_recipient_idx ON delivery_logs (recipient_id, attempted_at);
"#;

/// Audit sink writing one `delivery_logs` row per channel outcome.
pub struct PostgresAuditSink {
    client: Client,
}

impl PostgresAuditSink {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.client
            .batch_execute(CREATE_DELIVERY_LOGS)
            .await
            .map_err(|e| anyhow!("Failed to create delivery_logs table: {}", e))
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl DeliverySink for PostgresAuditSink {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn write(&self, record: &DeliveryRecord) -> Result<(), Error> {
        let status = record.status.to_string();
        let error_code = record.error_code.map(|code| code.as_str());

        self.client
            .execute(
                r#"
                INSERT INTO delivery_logs (
                    event_id,
                    recipient_id,
                    event_kind,
                    template_id,
                    channel,
                    status,
                    provider_message_id,
                    error_code,
                    error_message,
                    attempted_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
                &[
                    &record.event_id,
                    &record.recipient_id,
                    &record.event_kind.as_str(),
                    &record.template_id,
                    &record.channel.as_str(),
                    &status,
                    &record.provider_message_id,
                    &error_code,
                    &record.error_message,
                    &record.attempted_at,
                ],
            )
            .await
            .map_err(|e| anyhow!("Database write failed: {}", e))?;

        debug!(
            event_id = %record.event_id,
            channel = %record.channel,
            status = %status,
            "Delivery log written to database"
        );

        Ok(())
    }
}
