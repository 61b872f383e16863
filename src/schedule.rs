use std::path::PathBuf;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Next wall-clock midnight strictly after `now`, in the given offset
pub fn next_midnight(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    let tomorrow = local.date_naive() + Days::new(1);
    let Some(midnight) = tomorrow.and_hms_opt(0, 0, 0) else {
        return now + chrono::Duration::days(1);
    };
    // Fixed offsets have no gaps or folds, so this is always Single
    offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now + chrono::Duration::days(1))
}

/// Calendar date of `now` in the given offset
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    last_tick: NaiveDate,
}

/// Remembers the last day that was decayed, optionally on disk, so restarts
/// neither repeat nor skip a day.
pub struct TickLedger {
    path: Option<PathBuf>,
    last_tick: Mutex<Option<NaiveDate>>,
}

impl TickLedger {
    pub fn in_memory() -> Self {
        Self { path: None, last_tick: Mutex::new(None) }
    }

    /// Open a ledger file. A missing file means no tick has run yet.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let last_tick = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let file: LedgerFile = serde_json::from_str(&content).map_err(|e| {
                    anyhow::anyhow!("Failed to parse tick ledger '{}': {}", path.display(), e)
                })?;
                info!("Tick ledger: last decay on {}", file.last_tick);
                Some(file.last_tick)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read tick ledger '{}': {}",
                    path.display(),
                    e
                ))
            }
        };
        Ok(Self { path: Some(path), last_tick: Mutex::new(last_tick) })
    }

    pub fn last_tick(&self) -> Option<NaiveDate> {
        *self.last_tick.lock()
    }

    /// Days in `(last_tick, today]` still waiting for a tick, oldest first,
    /// keeping only the most recent `cap`. An empty ledger is seeded with
    /// `today` and owes nothing.
    pub fn owed_ticks(&self, today: NaiveDate, cap: usize) -> Vec<NaiveDate> {
        let mut last_tick = self.last_tick.lock();
        let Some(last) = *last_tick else {
            *last_tick = Some(today);
            drop(last_tick);
            if let Err(e) = self.save(today) {
                warn!("Failed to seed tick ledger: {}", e);
            }
            return Vec::new();
        };
        drop(last_tick);

        let mut owed: Vec<NaiveDate> = last
            .iter_days()
            .skip(1)
            .take_while(|d| *d <= today)
            .collect();
        if owed.len() > cap {
            let dropped = owed.len() - cap;
            warn!("{} missed decay days beyond catch-up limit are dropped", dropped);
            owed.drain(..dropped);
        }
        owed
    }

    /// Record a completed tick for `day`
    pub fn record(&self, day: NaiveDate) -> anyhow::Result<()> {
        {
            let mut last_tick = self.last_tick.lock();
            if matches!(*last_tick, Some(last) if last >= day) {
                return Ok(());
            }
            *last_tick = Some(day);
        }
        self.save(day)
    }

    fn save(&self, day: NaiveDate) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string(&LedgerFile { last_tick: day })?;
        // Write-then-rename so a crash never leaves a torn ledger
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_next_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        let next = next_midnight(now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_next_midnight_exactly_at_midnight_is_next_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();
        let next = next_midnight(now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_next_midnight_with_offset() {
        // 20:00 UTC is 15:00 at UTC-5; local midnight is 05:00 UTC next day
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap();
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(next_midnight(now, offset), Utc.with_ymd_and_hms(2024, 3, 11, 5, 0, 0).unwrap());
        assert_eq!(local_date(now, offset), date(2024, 3, 10));
    }

    #[test]
    fn test_fresh_ledger_owes_nothing() {
        let ledger = TickLedger::in_memory();
        assert!(ledger.owed_ticks(date(2024, 5, 1), 7).is_empty());
        assert_eq!(ledger.last_tick(), Some(date(2024, 5, 1)));
        assert!(ledger.owed_ticks(date(2024, 5, 1), 7).is_empty(), "same day owes nothing");
    }

    #[test]
    fn test_owed_days_after_downtime() {
        let ledger = TickLedger::in_memory();
        ledger.record(date(2024, 5, 1)).unwrap();
        assert_eq!(
            ledger.owed_ticks(date(2024, 5, 4), 7),
            vec![date(2024, 5, 2), date(2024, 5, 3), date(2024, 5, 4)]
        );
        assert_eq!(ledger.owed_ticks(date(2024, 5, 4), 2), vec![date(2024, 5, 3), date(2024, 5, 4)]);
    }

    #[test]
    fn test_record_never_goes_backwards() {
        let ledger = TickLedger::in_memory();
        ledger.record(date(2024, 5, 3)).unwrap();
        ledger.record(date(2024, 5, 2)).unwrap();
        assert_eq!(ledger.last_tick(), Some(date(2024, 5, 3)));
        assert!(ledger.owed_ticks(date(2024, 5, 3), 7).is_empty());
    }

    #[test]
    fn test_ledger_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decay-ledger.json");
        {
            let ledger = TickLedger::open(&path).unwrap();
            assert_eq!(ledger.last_tick(), None);
            ledger.record(date(2024, 6, 9)).unwrap();
        }
        let ledger = TickLedger::open(&path).unwrap();
        assert_eq!(ledger.last_tick(), Some(date(2024, 6, 9)));
        assert_eq!(ledger.owed_ticks(date(2024, 6, 10), 7), vec![date(2024, 6, 10)]);
    }

    #[test]
    fn test_corrupt_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decay-ledger.json");
        std::fs::write(&path, "{oops").unwrap();
        assert!(TickLedger::open(&path).is_err());
    }
}
