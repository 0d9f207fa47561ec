//! Main store implementation.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use smartroom_types::{Actuator, ActuatorStatus, Sample};

use crate::error::{Error, Result};
use crate::models::{ActivityEntry, ActivityPage, StoredActuatorEvent, StoredSample};
use crate::queries::ActivityQuery;
use crate::schema;

/// SQLite-based store for smart-room samples and actuator events.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

/// Unix milliseconds for a timestamp.
pub(crate) fn to_millis(time: OffsetDateTime) -> i64 {
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Timestamp for stored Unix milliseconds.
pub(crate) fn from_millis(ms: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|_| Error::InvalidTimestamp(ms))
}

/// Row-mapping variant of [`from_millis`].
fn column_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let ms: i64 = row.get(idx)?;
    from_millis(ms).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn column_actuator(row: &Row<'_>, idx: usize) -> rusqlite::Result<Actuator> {
    let name: String = row.get(idx)?;
    Actuator::from_name(&name).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn column_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<ActuatorStatus> {
    let level: i64 = row.get(idx)?;
    ActuatorStatus::from_level(level).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, level))
}

// Sample operations
impl Store {
    /// Persist one complete sample.
    ///
    /// The parent row and the four channel rows are written in one transaction,
    /// so a failure leaves no partial sample behind. `captured_at` is truncated
    /// to millisecond precision; the returned record matches what a later read
    /// would return.
    pub fn insert_sample(&self, sample: &Sample, captured_at: OffsetDateTime) -> Result<StoredSample> {
        let ms = to_millis(captured_at);
        let tx = self.conn.unchecked_transaction()?;

        tx.execute("INSERT INTO input_device (timestamps) VALUES (?1)", [ms])?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO temp_sensor (input_device_id, temperature) VALUES (?1, ?2)",
            rusqlite::params![id, sample.temperature],
        )?;
        tx.execute(
            "INSERT INTO humid_sensor (input_device_id, humidity) VALUES (?1, ?2)",
            rusqlite::params![id, sample.humidity],
        )?;
        tx.execute(
            "INSERT INTO light_sensor (input_device_id, light_intensity) VALUES (?1, ?2)",
            rusqlite::params![id, sample.light_intensity],
        )?;
        tx.execute(
            "INSERT INTO infrared_sensor (input_device_id, current_status) VALUES (?1, ?2)",
            rusqlite::params![id, sample.current_status],
        )?;

        tx.commit()?;
        debug!("Stored sample {}", id);

        Ok(StoredSample::new(id, from_millis(ms)?, sample))
    }

    /// The most recent complete sample, if any.
    pub fn latest_sample(&self) -> Result<Option<StoredSample>> {
        let sample = self
            .conn
            .query_row(
                "SELECT i.id, i.timestamps, t.temperature, h.humidity, l.light_intensity,
                        ir.current_status
                 FROM input_device i
                 JOIN temp_sensor t ON i.id = t.input_device_id
                 JOIN humid_sensor h ON i.id = h.input_device_id
                 JOIN light_sensor l ON i.id = l.input_device_id
                 JOIN infrared_sensor ir ON i.id = ir.input_device_id
                 ORDER BY i.timestamps DESC, i.id DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok(StoredSample {
                        id: row.get(0)?,
                        captured_at: column_time(row, 1)?,
                        temperature: row.get(2)?,
                        humidity: row.get(3)?,
                        light_intensity: row.get(4)?,
                        current_status: row.get(5)?,
                    })
                },
            )
            .optional()?;

        Ok(sample)
    }

    /// Count persisted samples.
    pub fn count_samples(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM input_device", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// Actuator event operations
impl Store {
    /// Persist one actuator state change.
    pub fn insert_actuator_event(
        &self,
        actuator: Actuator,
        status: ActuatorStatus,
        recorded_at: OffsetDateTime,
    ) -> Result<StoredActuatorEvent> {
        let ms = to_millis(recorded_at);

        self.conn.execute(
            "INSERT INTO output_device (timestamps, type, status) VALUES (?1, ?2, ?3)",
            rusqlite::params![ms, actuator.as_str(), status.level()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Stored {} event {} (status {})", actuator, id, status.level());

        Ok(StoredActuatorEvent {
            id,
            recorded_at: from_millis(ms)?,
            actuator,
            status,
        })
    }

    /// The most recent event for one actuator.
    pub fn latest_actuator_event(&self, actuator: Actuator) -> Result<Option<StoredActuatorEvent>> {
        let event = self
            .conn
            .query_row(
                "SELECT id, timestamps, type, status FROM output_device
                 WHERE type = ?1
                 ORDER BY timestamps DESC, id DESC
                 LIMIT 1",
                [actuator.as_str()],
                |row| {
                    Ok(StoredActuatorEvent {
                        id: row.get(0)?,
                        recorded_at: column_time(row, 1)?,
                        actuator: column_actuator(row, 2)?,
                        status: column_status(row, 3)?,
                    })
                },
            )
            .optional()?;

        Ok(event)
    }

    /// Count actuator events, optionally for one actuator.
    pub fn count_actuator_events(&self, actuator: Option<Actuator>) -> Result<u64> {
        let count: i64 = match actuator {
            Some(a) => self.conn.query_row(
                "SELECT COUNT(*) FROM output_device WHERE type = ?",
                [a.as_str()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM output_device", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

// Activity log
impl Store {
    /// One page of the combined activity log, newest first.
    pub fn query_activity(&self, query: &ActivityQuery) -> Result<ActivityPage> {
        let Some(sql) = query.build_sql() else {
            return Ok(ActivityPage {
                data: Vec::new(),
                page: query.page,
                total_pages: 0,
                total_records: 0,
            });
        };

        debug!("Executing query: {}", sql.select);

        let total: i64 = self.conn.query_row(
            &sql.count,
            rusqlite::params_from_iter(sql.params.iter()),
            |row| row.get(0),
        )?;
        let total_records = total as u64;

        let mut params = sql.params;
        params.push(Value::Integer(i64::from(query.limit)));
        params.push(Value::Integer(query.offset() as i64));

        let mut stmt = self.conn.prepare(&sql.select)?;
        let data = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                let actuator = row
                    .get::<_, Option<String>>(6)?
                    .map(|_| column_actuator(row, 6))
                    .transpose()?;
                let status = row
                    .get::<_, Option<i64>>(7)?
                    .map(|_| column_status(row, 7))
                    .transpose()?;

                Ok(ActivityEntry {
                    log_id: row.get(0)?,
                    timestamps: column_time(row, 1)?,
                    temperature: row.get(2)?,
                    humidity: row.get(3)?,
                    light_intensity: row.get(4)?,
                    current_status: row.get(5)?,
                    actuator,
                    status,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ActivityPage {
            data,
            page: query.page,
            total_pages: total_records.div_ceil(u64::from(query.limit)),
            total_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{ActivityFilter, StatusFilter};
    use time::Duration;

    fn create_test_sample() -> Sample {
        Sample {
            temperature: 24.5,
            humidity: 55.0,
            light_intensity: 80.0,
            current_status: true,
        }
    }

    fn base_time() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_samples().unwrap(), 0);
        assert!(store.latest_sample().unwrap().is_none());
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        let store = Store::open(&path).unwrap();
        store.insert_sample(&create_test_sample(), base_time()).unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.count_samples().unwrap(), 1);
    }

    #[test]
    fn test_insert_and_read_sample() {
        let store = Store::open_in_memory().unwrap();
        let sample = create_test_sample();

        let stored = store.insert_sample(&sample, base_time()).unwrap();
        assert_eq!(stored.sample(), sample);
        assert_eq!(stored.captured_at, base_time());

        let latest = store.latest_sample().unwrap().unwrap();
        assert_eq!(latest, stored);
    }

    #[test]
    fn test_sample_writes_one_row_per_channel() {
        let store = Store::open_in_memory().unwrap();
        let stored = store.insert_sample(&create_test_sample(), base_time()).unwrap();

        for table in ["temp_sensor", "humid_sensor", "light_sensor", "infrared_sensor"] {
            let count: i64 = store
                .conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE input_device_id = ?"),
                    [stored.id],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "{table}");
        }
    }

    #[test]
    fn test_sample_timestamp_truncated_to_millis() {
        let store = Store::open_in_memory().unwrap();
        let captured_at = base_time() + Duration::nanoseconds(1_234_567);

        let stored = store.insert_sample(&create_test_sample(), captured_at).unwrap();
        assert_eq!(stored.captured_at, base_time() + Duration::milliseconds(1));
        assert_eq!(store.latest_sample().unwrap().unwrap().captured_at, stored.captured_at);
    }

    #[test]
    fn test_latest_sample_is_newest() {
        let store = Store::open_in_memory().unwrap();
        let mut later = create_test_sample();
        later.temperature = 26.0;

        store.insert_sample(&create_test_sample(), base_time()).unwrap();
        store
            .insert_sample(&later, base_time() + Duration::seconds(10))
            .unwrap();

        let latest = store.latest_sample().unwrap().unwrap();
        assert_eq!(latest.temperature, 26.0);
        assert_eq!(store.count_samples().unwrap(), 2);
    }

    #[test]
    fn test_failed_sample_leaves_nothing_behind() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute_batch("DROP TABLE infrared_sensor;")
            .unwrap();

        assert!(store.insert_sample(&create_test_sample(), base_time()).is_err());
        assert_eq!(store.count_samples().unwrap(), 0);
    }

    #[test]
    fn test_actuator_events() {
        let store = Store::open_in_memory().unwrap();

        let first = store
            .insert_actuator_event(Actuator::MiniFan, ActuatorStatus::On, base_time())
            .unwrap();
        let second = store
            .insert_actuator_event(
                Actuator::MiniFan,
                ActuatorStatus::Off,
                base_time() + Duration::seconds(5),
            )
            .unwrap();
        assert!(second.id > first.id);

        let latest = store.latest_actuator_event(Actuator::MiniFan).unwrap().unwrap();
        assert_eq!(latest, second);
        assert!(store.latest_actuator_event(Actuator::RgbLight).unwrap().is_none());

        assert_eq!(store.count_actuator_events(None).unwrap(), 2);
        assert_eq!(store.count_actuator_events(Some(Actuator::MiniFan)).unwrap(), 2);
        assert_eq!(store.count_actuator_events(Some(Actuator::Automation)).unwrap(), 0);
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        let mut dark = create_test_sample();
        dark.current_status = false;
        dark.light_intensity = 12.0;

        store.insert_sample(&create_test_sample(), base_time()).unwrap();
        store
            .insert_actuator_event(
                Actuator::MiniFan,
                ActuatorStatus::On,
                base_time() + Duration::seconds(1),
            )
            .unwrap();
        store
            .insert_sample(&dark, base_time() + Duration::seconds(2))
            .unwrap();
        store
            .insert_actuator_event(
                Actuator::RgbLight,
                ActuatorStatus::Off,
                base_time() + Duration::seconds(3),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_activity_newest_first() {
        let store = seeded_store();

        let page = store.query_activity(&ActivityQuery::new()).unwrap();
        assert_eq!(page.total_records, 4);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.data.len(), 4);

        assert_eq!(page.data[0].actuator, Some(Actuator::RgbLight));
        assert_eq!(page.data[0].status, Some(ActuatorStatus::Off));
        assert!(page.data[1].is_sample());
        assert_eq!(page.data[1].light_intensity, Some(12.0));
        assert_eq!(page.data[2].actuator, Some(Actuator::MiniFan));
        assert!(page.data[3].is_sample());
        assert_eq!(page.data[3].current_status, Some(true));
    }

    #[test]
    fn test_activity_pagination() {
        let store = seeded_store();

        let page = store
            .query_activity(&ActivityQuery::new().page(2).limit(3))
            .unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.total_records, 4);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].temperature, Some(24.5));
    }

    #[test]
    fn test_activity_filters() {
        let store = seeded_store();

        let sensors = store
            .query_activity(&ActivityQuery::new().kind(ActivityFilter::Sensor))
            .unwrap();
        assert_eq!(sensors.total_records, 2);
        assert!(sensors.data.iter().all(ActivityEntry::is_sample));

        let fan = store
            .query_activity(&ActivityQuery::new().kind(ActivityFilter::Actuator(Actuator::MiniFan)))
            .unwrap();
        assert_eq!(fan.total_records, 1);
        assert_eq!(fan.data[0].actuator, Some(Actuator::MiniFan));

        let off = store
            .query_activity(&ActivityQuery::new().status(StatusFilter::Off))
            .unwrap();
        assert_eq!(off.total_records, 1);
        assert_eq!(off.data[0].actuator, Some(Actuator::RgbLight));

        let detected = store
            .query_activity(&ActivityQuery::new().status(StatusFilter::Detected))
            .unwrap();
        assert_eq!(detected.total_records, 1);
        assert_eq!(detected.data[0].current_status, Some(true));

        let since = store
            .query_activity(&ActivityQuery::new().since(base_time() + Duration::seconds(2)))
            .unwrap();
        assert_eq!(since.total_records, 2);

        let until = store
            .query_activity(&ActivityQuery::new().until(base_time() + Duration::seconds(1)))
            .unwrap();
        assert_eq!(until.total_records, 2);
    }

    #[test]
    fn test_activity_keyword() {
        let store = seeded_store();

        let fan = store
            .query_activity(&ActivityQuery::new().keyword("minifan"))
            .unwrap();
        assert_eq!(fan.total_records, 1);

        let dim = store.query_activity(&ActivityQuery::new().keyword("12")).unwrap();
        assert_eq!(dim.total_records, 1);
        assert_eq!(dim.data[0].light_intensity, Some(12.0));

        let hostile = store
            .query_activity(&ActivityQuery::new().keyword("' OR 1=1 --"))
            .unwrap();
        assert_eq!(hostile.total_records, 0);
        assert_eq!(store.count_samples().unwrap(), 2);
    }

    #[test]
    fn test_activity_contradictory_filters() {
        let store = seeded_store();

        let page = store
            .query_activity(
                &ActivityQuery::new()
                    .kind(ActivityFilter::Sensor)
                    .status(StatusFilter::On),
            )
            .unwrap();
        assert_eq!(page.total_records, 0);
        assert!(page.data.is_empty());
    }

    #[test]
    fn test_stored_sample_serialization() {
        let store = Store::open_in_memory().unwrap();
        let stored = store.insert_sample(&create_test_sample(), base_time()).unwrap();

        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["input_device_id"], stored.id);
        assert_eq!(json["temperature"], 24.5);
        assert_eq!(json["current_status"], true);
        assert_eq!(json["timestamps"], "2023-11-14T22:13:20Z");
    }
}
