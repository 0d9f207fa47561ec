//! Query builder for the combined activity log.
//!
//! The activity log is the union of persisted samples and actuator events,
//! newest first. Every caller-supplied filter is bound as a parameter; no
//! caller input is ever spliced into the SQL text.
//!
//! # Example
//!
//! ```
//! use smartroom_store::{ActivityFilter, ActivityQuery, StatusFilter, Store};
//! use smartroom_types::Actuator;
//!
//! let store = Store::open_in_memory()?;
//!
//! // Second page of "fan switched on" events
//! let query = ActivityQuery::new()
//!     .kind(ActivityFilter::Actuator(Actuator::MiniFan))
//!     .status(StatusFilter::On)
//!     .page(2)
//!     .limit(20);
//!
//! let page = store.query_activity(&query)?;
//! assert_eq!(page.total_records, 0);
//! # Ok::<(), smartroom_store::Error>(())
//! ```

use rusqlite::types::Value;
use time::OffsetDateTime;

use smartroom_types::Actuator;

use crate::store::to_millis;

/// Default page size.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Which rows of the activity log to include.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ActivityFilter {
    /// Samples and actuator events.
    #[default]
    All,
    /// Samples only.
    Sensor,
    /// Events of one actuator only.
    Actuator(Actuator),
}

impl ActivityFilter {
    /// Parse the `type` query value (`all`, `sensor`, or an actuator kind).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(ActivityFilter::All),
            "sensor" => Some(ActivityFilter::Sensor),
            other => Actuator::from_name(other).ok().map(ActivityFilter::Actuator),
        }
    }
}

/// Status filter. `On`/`Off` select actuator events, `Detected`/`Clear`
/// select samples by infrared status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    On,
    Off,
    Detected,
    Clear,
}

impl StatusFilter {
    /// Parse the `status` query value (`all`, `on`, `off`, `detected`, `none`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(StatusFilter::All),
            "on" => Some(StatusFilter::On),
            "off" => Some(StatusFilter::Off),
            "detected" => Some(StatusFilter::Detected),
            "none" => Some(StatusFilter::Clear),
            _ => None,
        }
    }
}

/// Fluent query builder for [`Store::query_activity`](crate::Store::query_activity).
#[derive(Debug, Clone)]
pub struct ActivityQuery {
    /// Only rows at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Only rows at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Row kind filter.
    pub kind: ActivityFilter,
    /// Status filter.
    pub status: StatusFilter,
    /// Substring match on channel values or actuator kind.
    pub keyword: Option<String>,
    /// 1-based page number.
    pub page: u32,
    /// Rows per page.
    pub limit: u32,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityQuery {
    /// All rows, first page, [`DEFAULT_PAGE_SIZE`] rows per page.
    pub fn new() -> Self {
        Self {
            since: None,
            until: None,
            kind: ActivityFilter::All,
            status: StatusFilter::All,
            keyword: None,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    pub fn kind(mut self, kind: ActivityFilter) -> Self {
        self.kind = kind;
        self
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    /// Match rows whose values contain `keyword`. Empty keywords are ignored.
    pub fn keyword(mut self, keyword: &str) -> Self {
        self.keyword = if keyword.is_empty() {
            None
        } else {
            Some(keyword.to_string())
        };
        self
    }

    /// Select a page. Values below 1 are clamped to 1.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Set the page size. Values below 1 are clamped to 1.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub(crate) fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    fn includes_samples(&self) -> bool {
        matches!(self.kind, ActivityFilter::All | ActivityFilter::Sensor)
            && matches!(
                self.status,
                StatusFilter::All | StatusFilter::Detected | StatusFilter::Clear
            )
    }

    fn includes_events(&self) -> bool {
        matches!(self.kind, ActivityFilter::All | ActivityFilter::Actuator(_))
            && matches!(
                self.status,
                StatusFilter::All | StatusFilter::On | StatusFilter::Off
            )
    }

    fn like_pattern(&self) -> Option<String> {
        self.keyword.as_ref().map(|k| {
            let escaped = k
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
    }

    fn time_conditions(
        &self,
        column: &str,
        conditions: &mut Vec<String>,
        params: &mut Vec<Value>,
    ) {
        if let Some(since) = self.since {
            conditions.push(format!("{} >= ?", column));
            params.push(Value::Integer(to_millis(since)));
        }
        if let Some(until) = self.until {
            conditions.push(format!("{} <= ?", column));
            params.push(Value::Integer(to_millis(until)));
        }
    }

    /// FROM/WHERE tail of the sample half, with its parameters.
    fn sample_source(&self) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        self.time_conditions("i.timestamps", &mut conditions, &mut params);

        if let Some(pattern) = self.like_pattern() {
            conditions.push(
                "(CAST(t.temperature AS TEXT) LIKE ? ESCAPE '\\' \
                 OR CAST(h.humidity AS TEXT) LIKE ? ESCAPE '\\' \
                 OR CAST(l.light_intensity AS TEXT) LIKE ? ESCAPE '\\' \
                 OR CAST(ir.current_status AS TEXT) LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            params.extend(std::iter::repeat_n(Value::Text(pattern), 4));
        }

        match self.status {
            StatusFilter::Detected => conditions.push("ir.current_status = 1".to_string()),
            StatusFilter::Clear => conditions.push("ir.current_status = 0".to_string()),
            _ => {}
        }

        let from = format!(
            "FROM input_device i \
             JOIN temp_sensor t ON i.id = t.input_device_id \
             JOIN humid_sensor h ON i.id = h.input_device_id \
             JOIN light_sensor l ON i.id = l.input_device_id \
             JOIN infrared_sensor ir ON i.id = ir.input_device_id{}",
            where_clause(&conditions)
        );

        (from, params)
    }

    /// FROM/WHERE tail of the actuator half, with its parameters.
    fn event_source(&self) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        self.time_conditions("o.timestamps", &mut conditions, &mut params);

        if let Some(pattern) = self.like_pattern() {
            conditions.push("o.type LIKE ? ESCAPE '\\'".to_string());
            params.push(Value::Text(pattern));
        }

        if let ActivityFilter::Actuator(actuator) = self.kind {
            conditions.push("o.type = ?".to_string());
            params.push(Value::Text(actuator.as_str().to_string()));
        }

        match self.status {
            StatusFilter::On => conditions.push("o.status = 1".to_string()),
            StatusFilter::Off => conditions.push("o.status = 0".to_string()),
            _ => {}
        }

        (
            format!("FROM output_device o{}", where_clause(&conditions)),
            params,
        )
    }

    /// Build the page query and the count query.
    ///
    /// Returns `None` when the filters exclude both halves of the log. The page
    /// query takes `params` followed by `LIMIT` and `OFFSET`; the count query
    /// takes `params` only.
    pub(crate) fn build_sql(&self) -> Option<ActivitySql> {
        let mut selects = Vec::new();
        let mut counts = Vec::new();
        let mut params = Vec::new();

        if self.includes_samples() {
            let (from, p) = self.sample_source();
            selects.push(format!(
                "SELECT i.id AS log_id, i.timestamps AS timestamps, \
                 t.temperature AS temperature, h.humidity AS humidity, \
                 l.light_intensity AS light_intensity, ir.current_status AS current_status, \
                 NULL AS type, NULL AS status {}",
                from
            ));
            counts.push(format!("(SELECT COUNT(*) {})", from));
            params.extend(p);
        }

        if self.includes_events() {
            let (from, p) = self.event_source();
            selects.push(format!(
                "SELECT o.id AS log_id, o.timestamps AS timestamps, \
                 NULL AS temperature, NULL AS humidity, NULL AS light_intensity, \
                 NULL AS current_status, o.type AS type, o.status AS status {}",
                from
            ));
            counts.push(format!("(SELECT COUNT(*) {})", from));
            params.extend(p);
        }

        if selects.is_empty() {
            return None;
        }

        let select = format!(
            "SELECT log_id, timestamps, temperature, humidity, light_intensity, \
             current_status, type, status FROM ({}) \
             ORDER BY timestamps DESC, log_id DESC LIMIT ? OFFSET ?",
            selects.join(" UNION ALL ")
        );
        let count = format!("SELECT {}", counts.join(" + "));

        Some(ActivitySql {
            select,
            count,
            params,
        })
    }
}

/// SQL text and bound parameters for one activity query.
pub(crate) struct ActivitySql {
    pub select: String,
    pub count: String,
    pub params: Vec<Value>,
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_query_defaults() {
        let query = ActivityQuery::new();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.offset(), 0);
        assert!(query.includes_samples());
        assert!(query.includes_events());
    }

    #[test]
    fn test_activity_query_offset() {
        let query = ActivityQuery::new().page(3).limit(25);
        assert_eq!(query.offset(), 50);

        let clamped = ActivityQuery::new().page(0).limit(0);
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.limit, 1);
    }

    #[test]
    fn test_filters_select_halves() {
        let sensors = ActivityQuery::new().kind(ActivityFilter::Sensor);
        assert!(sensors.includes_samples());
        assert!(!sensors.includes_events());

        let fan = ActivityQuery::new().kind(ActivityFilter::Actuator(Actuator::MiniFan));
        assert!(!fan.includes_samples());
        assert!(fan.includes_events());

        let detected = ActivityQuery::new().status(StatusFilter::Detected);
        assert!(detected.includes_samples());
        assert!(!detected.includes_events());

        let contradictory = ActivityQuery::new()
            .kind(ActivityFilter::Sensor)
            .status(StatusFilter::On);
        assert!(contradictory.build_sql().is_none());
    }

    #[test]
    fn test_keyword_is_bound_not_spliced() {
        let query = ActivityQuery::new().keyword("'; DROP TABLE input_device; --");
        let sql = query.build_sql().unwrap();

        assert!(!sql.select.contains("DROP TABLE"));
        assert!(!sql.count.contains("DROP TABLE"));
        // Four channel columns plus the actuator kind
        assert_eq!(sql.params.len(), 5);
    }

    #[test]
    fn test_keyword_wildcards_are_escaped() {
        let query = ActivityQuery::new().keyword("50%_");
        assert_eq!(query.like_pattern().as_deref(), Some("%50\\%\\_%"));
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!(ActivityFilter::parse("all"), Some(ActivityFilter::All));
        assert_eq!(ActivityFilter::parse("sensor"), Some(ActivityFilter::Sensor));
        assert_eq!(
            ActivityFilter::parse("minifan"),
            Some(ActivityFilter::Actuator(Actuator::MiniFan))
        );
        assert_eq!(ActivityFilter::parse("heater"), None);

        assert_eq!(StatusFilter::parse("none"), Some(StatusFilter::Clear));
        assert_eq!(StatusFilter::parse("detected"), Some(StatusFilter::Detected));
        assert_eq!(StatusFilter::parse("maybe"), None);
    }
}
