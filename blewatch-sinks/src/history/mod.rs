pub mod jsonl;
pub mod log;
pub mod noop;
pub mod sqlite;

use std::{
    error::Error,
    fs::OpenOptions,
    io::BufWriter,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use blewatch_domain::report::SensorReport;

use crate::history::{jsonl::JsonLinesNotificationSink, sqlite::SqliteNotificationSink};

#[async_trait]
pub trait NotificationSink: Send {
    async fn save(&mut self, reports: &[SensorReport]) -> Result<(), Box<dyn Error>>;
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>>;
}

/// Where to record history, picked from the command line.
#[derive(PartialEq, Debug, Clone)]
pub enum NotificationSinkFormat {
    Sqlite(PathBuf),
    JsonLines(PathBuf),
}

impl NotificationSinkFormat {
    /// Picks the format from the file extension.
    pub fn create_from_file<P>(path_arg: P) -> Result<NotificationSinkFormat, Box<dyn Error>>
    where
        P: AsRef<Path>,
    {
        let path = path_arg.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("sqlite" | "db") => Ok(NotificationSinkFormat::Sqlite(path.to_path_buf())),
            Some("jsonl") => Ok(NotificationSinkFormat::JsonLines(path.to_path_buf())),
            _ => Err(format!("unknown type: {}", path.display()).into()),
        }
    }

    pub async fn to_sink(&self) -> Result<Box<dyn NotificationSink>, Box<dyn Error>> {
        use NotificationSinkFormat::*;
        match self {
            Sqlite(path_buf) => SqliteNotificationSink::create_from_file(path_buf).await,
            JsonLines(path_buf) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path_buf)?;
                Ok(Box::new(JsonLinesNotificationSink::create_from_writer(
                    Box::new(BufWriter::new(file)),
                )))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use chrono::{TimeZone, Utc};

    use blewatch_domain::{report::SensorReport, telemetry::Attribute};

    use super::NotificationSinkFormat;

    #[test]
    fn format_matching() {
        assert_eq!(
            NotificationSinkFormat::create_from_file("history.sqlite").unwrap(),
            NotificationSinkFormat::Sqlite("history.sqlite".into())
        );
        assert_eq!(
            NotificationSinkFormat::create_from_file("out/history.jsonl").unwrap(),
            NotificationSinkFormat::JsonLines("out/history.jsonl".into())
        );
    }

    #[test]
    fn format_not_matching() {
        let invalid = vec!["foop.json", "farp", "feep.txt"];

        for i in invalid {
            assert!(NotificationSinkFormat::create_from_file(i).is_err());
        }
    }

    #[tokio::test]
    async fn sink_from_inferred_format_appends() {
        let path = std::env::temp_dir().join(format!("blewatch-{}.jsonl", std::process::id()));
        let _ = fs::remove_file(&path);
        let report = SensorReport::new(
            Utc.timestamp_opt(0, 0).unwrap(),
            Attribute::BatteryLevel,
            Some(80.0.into()),
        );

        for _ in 0..2 {
            let mut sink = NotificationSinkFormat::create_from_file(&path)
                .unwrap()
                .to_sink()
                .await
                .unwrap();
            sink.save(&[report.clone()]).await.unwrap();
            sink.close().await.unwrap();
        }

        let written = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(written.lines().count(), 2);
        assert!(written.contains(r#""attribute":"battery_level""#));
    }
}
