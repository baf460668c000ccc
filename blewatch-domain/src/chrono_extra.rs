/// Drops sub-second precision so durations print as "3m 12s" rather than "3m 12s 418ms".
pub trait Truncate {
    fn truncate_to_seconds(&self) -> Self;
}

impl Truncate for chrono::Duration {
    fn truncate_to_seconds(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.num_seconds())
    }
}

impl Truncate for std::time::Duration {
    fn truncate_to_seconds(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.as_secs())
    }
}

/// Run time since `start`, in whole seconds; zero if the clock went backwards.
pub fn elapsed_since(
    start: chrono::DateTime<chrono::Utc>,
    now: chrono::DateTime<chrono::Utc>,
) -> std::time::Duration {
    (now - start)
        .truncate_to_seconds()
        .to_std()
        .unwrap_or_default()
}
