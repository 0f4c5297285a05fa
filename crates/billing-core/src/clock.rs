use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::Result;

/// Abstract "now"/"today"/date arithmetic so the engine can be driven by a
/// shared mock time in tests instead of the wall clock. Every time-sensitive
/// operation — API handlers and the periodic worker alike — must read the
/// clock rather than calling `Utc::now()` directly.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn now(&self) -> Result<DateTime<Utc>>;

    async fn today(&self) -> Result<NaiveDate> {
        Ok(self.now().await?.date_naive())
    }

    async fn add_days(&self, n: i64) -> Result<DateTime<Utc>> {
        let now = self.now().await?;
        if n >= 0 {
            Ok(now + chrono::Duration::days(n))
        } else {
            Ok(now - chrono::Duration::days(-n))
        }
    }
}

/// Production clock: reads the OS wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

#[async_trait]
impl Clock for WallClock {
    async fn now(&self) -> Result<DateTime<Utc>> {
        Ok(Utc::now())
    }
}

/// Test/mock clock: reads a persisted value from a shared key-value store
/// (a single-row table in Postgres, or an in-memory stand-in for unit tests)
/// so that separate processes — a request handler and the periodic worker —
/// agree on "now" without relying on a process-local global.
#[async_trait]
pub trait MockClockStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<DateTime<Utc>>>;
    async fn write(&self, key: &str, value: DateTime<Utc>) -> Result<()>;
}

pub struct MockClock<S: MockClockStore> {
    store: S,
    key: String,
}

impl<S: MockClockStore> MockClock<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    pub async fn set(&self, value: DateTime<Utc>) -> Result<()> {
        self.store.write(&self.key, value).await
    }

    pub async fn advance_days(&self, n: i64) -> Result<DateTime<Utc>> {
        let current = self.now().await?;
        let next = if n >= 0 {
            current + chrono::Duration::days(n)
        } else {
            current - chrono::Duration::days(-n)
        };
        self.store.write(&self.key, next).await?;
        Ok(next)
    }
}

#[async_trait]
impl<S: MockClockStore> Clock for MockClock<S> {
    async fn now(&self) -> Result<DateTime<Utc>> {
        match self.store.read(&self.key).await? {
            Some(v) => Ok(v),
            None => {
                let now = Utc::now();
                self.store.write(&self.key, now).await?;
                Ok(now)
            }
        }
    }
}

/// In-memory shared store, used by tests that want several `MockClock`
/// handles (standing in for separate processes) to observe the same time.
#[derive(Clone, Default)]
pub struct InMemoryClockStore {
    inner: std::sync::Arc<dashmap::DashMap<String, DateTime<Utc>>>,
}

impl InMemoryClockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MockClockStore for InMemoryClockStore {
    async fn read(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.inner.get(key).map(|v| *v))
    }

    async fn write(&self, key: &str, value: DateTime<Utc>) -> Result<()> {
        self.inner.insert(key.to_string(), value);
        Ok(())
    }
}

/// Day count for a UTC calendar month containing `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    let year = date.year_val();
    let month = date.month_val();
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid date");
    let first_of_this = NaiveDate::from_ymd_opt(year, month, 1).expect("valid date");
    (first_of_next - first_of_this).num_days() as u32
}

/// First day of the calendar month following `date`.
pub fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let year = date.year_val();
    let month = date.month_val();
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).expect("valid date")
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).expect("valid date")
    }
}

/// Last day of the calendar month containing `date`.
pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_next_month(date)
        .checked_sub_days(Days::new(1))
        .expect("month always has at least one day")
}

/// Small helpers so the free functions above read naturally; `chrono`'s
/// `Datelike` is re-exported under friendlier names to avoid an import clash
/// with `NaiveDate::year`/`month` shadowing in call sites that also use
/// `chrono::Datelike` directly.
trait DatelikeExt {
    fn year_val(&self) -> i32;
    fn month_val(&self) -> u32;
}

impl DatelikeExt for NaiveDate {
    fn year_val(&self) -> i32 {
        use chrono::Datelike;
        self.year()
    }

    fn month_val(&self) -> u32 {
        use chrono::Datelike;
        self.month()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_clock_shared_across_handles() {
        let store = InMemoryClockStore::new();
        let handle_a = MockClock::new(store.clone(), "test");
        let handle_b = MockClock::new(store.clone(), "test");

        let t = DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z").unwrap().with_timezone(&Utc);
        handle_a.set(t).await.unwrap();

        assert_eq!(handle_b.now().await.unwrap(), t);
    }

    #[test]
    fn month_boundary_helpers() {
        let jan31 = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(days_in_month(jan31), 31);
        assert_eq!(first_of_next_month(jan31), NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(last_of_month(jan31), jan31);

        let dec15 = NaiveDate::from_ymd_opt(2026, 12, 15).unwrap();
        assert_eq!(first_of_next_month(dec15), NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
    }

    #[test]
    fn thirty_day_month() {
        let apr1 = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        assert_eq!(days_in_month(apr1), 30);
    }
}
