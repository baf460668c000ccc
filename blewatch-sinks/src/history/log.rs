use std::error::Error;

use async_trait::async_trait;
use tracing::info;

use blewatch_domain::report::SensorReport;

use super::NotificationSink;

/// Writes each report to the `tracing` log at info level.
#[derive(Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn save(&mut self, reports: &[SensorReport]) -> Result<(), Box<dyn Error>> {
        for report in reports {
            info!(attribute = %report.attribute, "{report}");
        }
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}
