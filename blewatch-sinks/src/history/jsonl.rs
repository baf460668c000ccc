use std::{error::Error, io::Write};

use async_trait::async_trait;

use blewatch_domain::report::SensorReport;

use super::NotificationSink;

/// One JSON object per line, flushed after every batch.
pub struct JsonLinesNotificationSink<'a> {
    writer: Box<dyn Write + Send + 'a>,
}

impl<'a> JsonLinesNotificationSink<'a> {
    pub fn create_from_writer(writer: Box<dyn Write + Send + 'a>) -> JsonLinesNotificationSink<'a> {
        JsonLinesNotificationSink { writer }
    }
}

#[async_trait]
impl<'a> NotificationSink for JsonLinesNotificationSink<'a> {
    async fn save(&mut self, reports: &[SensorReport]) -> Result<(), Box<dyn Error>> {
        let w = &mut self.writer;
        for report in reports {
            serde_json::to_writer(&mut *w, report)?;
            writeln!(w)?;
        }
        w.flush()?;
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>> {
        self.writer.flush()?;
        Ok(())
    }
}
