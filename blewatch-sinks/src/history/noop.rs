use std::error::Error;

use async_trait::async_trait;

use blewatch_domain::report::SensorReport;

use super::NotificationSink;

#[derive(Default)]
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn save(&mut self, _: &[SensorReport]) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}
