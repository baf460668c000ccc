use std::{error::Error, path::Path, sync::Arc};

use async_trait::async_trait;
use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};

use blewatch_domain::report::SensorReport;

use super::NotificationSink;

/// Appends reports to the `sensor_reports` table. Unknown values are stored as NULL.
pub struct SqliteNotificationSink {
    pool: Arc<Pool<Sqlite>>,
}

impl SqliteNotificationSink {
    pub async fn create_from_file<P>(path_arg: P) -> Result<Box<dyn NotificationSink>, Box<dyn Error>>
    where
        P: AsRef<Path>,
    {
        let url = format!("sqlite://{}?mode=rwc", path_arg.as_ref().display());
        let pool = Arc::new(SqlitePoolOptions::new().connect(&url).await?);
        let sink = SqliteNotificationSink::create_from_pool(pool).await?;
        Ok(Box::new(sink))
    }

    pub async fn create_from_pool(
        pool: Arc<Pool<Sqlite>>,
    ) -> Result<SqliteNotificationSink, Box<dyn Error>> {
        sqlx::migrate!("../migrations").run(&*pool).await?;
        Ok(SqliteNotificationSink { pool })
    }
}

#[async_trait]
impl NotificationSink for SqliteNotificationSink {
    async fn save(&mut self, reports: &[SensorReport]) -> Result<(), Box<dyn Error>> {
        let mut tx = self.pool.begin().await?;

        for r in reports {
            let value = r.value.as_ref().map(serde_json::to_string).transpose()?;
            sqlx::query(
                "
            INSERT INTO sensor_reports (date_time, attribute, value)
            VALUES (?, ?, ?)",
            )
            .bind(r.date_time)
            .bind(r.attribute.key())
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>> {
        self.pool.close().await;
        Ok(())
    }
}
