//! Core data types for logfront

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Timestamp in milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Label set identifying one series or stream
pub type Labels = BTreeMap<String, String>;

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: Timestamp,
    /// End timestamp (exclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Check if a timestamp falls within this range
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Check if this range overlaps with another
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Intersection of two ranges, `None` when they do not overlap
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeRange { start, end })
    }

    /// Duration of this range in milliseconds (zero when empty or inverted)
    pub fn duration_millis(&self) -> i64 {
        (self.end - self.start).max(0)
    }

    /// True when the range covers no time
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Order in which log entries are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Oldest entries first
    #[default]
    Forward,
    /// Newest entries first
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Shape of a query result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Metric query: numeric samples per series
    Matrix,
    /// Log query: log lines per stream
    Streams,
}

/// A single log query as received by the frontend.
///
/// Requests are immutable values; the splitter and limiters derive new
/// requests with [`Request::with_range`] rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Query text
    pub query: String,
    /// Start of the evaluated range (inclusive)
    pub start: Timestamp,
    /// End of the evaluated range (exclusive); equal to `start` for instant queries
    pub end: Timestamp,
    /// Resolution step in milliseconds
    pub step: i64,
    /// Entry ordering
    pub direction: Direction,
    /// Maximum number of log entries to return (0 = unlimited)
    pub limit: u32,
    /// Logical API route the request arrived on
    pub path: String,
}

impl Request {
    /// Create a new request builder
    pub fn builder(query: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(query)
    }

    /// Create an instant request evaluated at `time`
    pub fn instant(query: impl Into<String>, time: Timestamp) -> Self {
        Self {
            query: query.into(),
            start: time,
            end: time,
            step: 0,
            direction: Direction::Forward,
            limit: 0,
            path: "/loki/api/v1/query".to_string(),
        }
    }

    /// Copy of this request over a different time range
    pub fn with_range(&self, start: Timestamp, end: Timestamp) -> Self {
        Self {
            start,
            end,
            ..self.clone()
        }
    }

    /// The request's time range
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }

    /// Instant queries evaluate a single point in time
    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }

    /// Length of the requested range in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.time_range().duration_millis()
    }

    /// Log queries start with a stream selector, everything else is a metric query
    pub fn result_kind(&self) -> ResultKind {
        if self.query.trim_start().starts_with('{') {
            ResultKind::Streams
        } else {
            ResultKind::Matrix
        }
    }
}

/// Request builder for fluent API
pub struct RequestBuilder {
    query: String,
    start: Timestamp,
    end: Timestamp,
    step: i64,
    direction: Direction,
    limit: u32,
    path: String,
}

impl RequestBuilder {
    /// Create a new request builder
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            start: 0,
            end: 0,
            step: 0,
            direction: Direction::Forward,
            limit: 0,
            path: "/loki/api/v1/query_range".to_string(),
        }
    }

    /// Set time range
    pub fn time_range(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Set step in milliseconds
    pub fn step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    /// Set direction
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set entry limit
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Set API path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Build the request.
    ///
    /// `start > end` is accepted; downstream components resolve it to safe
    /// defaults instead of failing.
    pub fn build(self) -> Result<Request> {
        if self.query.trim().is_empty() {
            return Err(CoreError::EmptyQuery);
        }
        Ok(Request {
            query: self.query,
            start: self.start,
            end: self.end,
            step: self.step,
            direction: self.direction,
            limit: self.limit,
            path: self.path,
        })
    }
}

/// One numeric sample of a metric series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: f64,
}

/// One log line of a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub timestamp: Timestamp,
    pub line: String,
}

/// Metric series result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub labels: Labels,
    pub samples: Vec<Sample>,
}

/// Log stream result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub labels: Labels,
    pub entries: Vec<Entry>,
}

/// Result payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum ResultData {
    Matrix(Vec<Series>),
    Streams(Vec<Stream>),
}

impl ResultData {
    /// Empty payload of the given kind
    pub fn empty(kind: ResultKind) -> Self {
        match kind {
            ResultKind::Matrix => ResultData::Matrix(Vec::new()),
            ResultKind::Streams => ResultData::Streams(Vec::new()),
        }
    }

    /// Kind of this payload
    pub fn kind(&self) -> ResultKind {
        match self {
            ResultData::Matrix(_) => ResultKind::Matrix,
            ResultData::Streams(_) => ResultKind::Streams,
        }
    }

    /// Label sets of every series or stream in the payload
    pub fn label_sets(&self) -> Vec<&Labels> {
        match self {
            ResultData::Matrix(series) => series.iter().map(|s| &s.labels).collect(),
            ResultData::Streams(streams) => streams.iter().map(|s| &s.labels).collect(),
        }
    }
}

/// Response status envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Success,
}

/// Execution statistics carried alongside a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseStats {
    /// Number of downstream sub-queries merged into this response
    pub sub_queries: usize,
}

/// A query response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub data: ResultData,
    pub stats: ResponseStats,
}

impl Response {
    /// Successful response with an empty payload shaped for `kind`
    pub fn empty(kind: ResultKind) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: ResultData::empty(kind),
            stats: ResponseStats::default(),
        }
    }

    /// Empty response shaped for a request
    pub fn empty_for(request: &Request) -> Self {
        Self::empty(request.result_kind())
    }

    /// Successful metric response
    pub fn matrix(series: Vec<Series>) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: ResultData::Matrix(series),
            stats: ResponseStats { sub_queries: 1 },
        }
    }

    /// Successful log response
    pub fn streams(streams: Vec<Stream>) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: ResultData::Streams(streams),
            stats: ResponseStats { sub_queries: 1 },
        }
    }

    /// Number of distinct label sets in the response
    pub fn series_count(&self) -> usize {
        self.data.label_sets().into_iter().collect::<HashSet<_>>().len()
    }
}

/// Index statistics returned by the statistics path for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of streams matched
    pub streams: u64,
    /// Number of chunks referenced
    pub chunks: u64,
    /// Estimated number of entries
    pub entries: u64,
    /// Estimated bytes to scan
    pub bytes: u64,
}

impl IndexStats {
    /// Stats with only the byte estimate set
    pub fn with_bytes(bytes: u64) -> Self {
        Self {
            bytes,
            ..Default::default()
        }
    }

    /// Accumulate another estimate into this one
    pub fn merge(&mut self, other: &IndexStats) {
        self.streams += other.streams;
        self.chunks += other.chunks;
        self.entries += other.entries;
        self.bytes += other.bytes;
    }
}

/// Render a label set as `{a="b", c="d"}`
pub fn format_labels(labels: &Labels) -> String {
    let inner: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{{{}}}", inner.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::new(100, 200);

        assert!(range.contains(100));
        assert!(range.contains(150));
        assert!(!range.contains(200)); // end is exclusive
        assert!(!range.contains(50));

        assert!(range.overlaps(&TimeRange::new(150, 250)));
        assert!(!range.overlaps(&TimeRange::new(200, 300)));

        assert_eq!(range.intersect(&TimeRange::new(150, 250)), Some(TimeRange::new(150, 200)));
        assert_eq!(range.intersect(&TimeRange::new(200, 300)), None);

        assert_eq!(range.duration_millis(), 100);
        assert_eq!(TimeRange::new(200, 100).duration_millis(), 0);
        assert!(TimeRange::new(5, 5).is_empty());
    }

    #[test]
    fn test_request_builder() {
        let req = Request::builder(r#"{app="foo"}"#)
            .time_range(1_000, 2_000)
            .step(30_000)
            .direction(Direction::Backward)
            .limit(100)
            .build()
            .unwrap();

        assert_eq!(req.start, 1_000);
        assert_eq!(req.end, 2_000);
        assert_eq!(req.step, 30_000);
        assert_eq!(req.direction, Direction::Backward);
        assert_eq!(req.limit, 100);
        assert_eq!(req.path, "/loki/api/v1/query_range");
        assert!(!req.is_instant());
        assert_eq!(req.duration_millis(), 1_000);

        assert!(matches!(Request::builder("  ").build(), Err(CoreError::EmptyQuery)));
    }

    #[test]
    fn test_inverted_range_is_accepted() {
        let req = Request::builder("rate({a=\"b\"}[1m])")
            .time_range(2_000, 1_000)
            .build()
            .unwrap();
        assert_eq!(req.duration_millis(), 0);
    }

    #[test]
    fn test_with_range_preserves_fields() {
        let req = Request::builder("sum(rate({a=\"b\"}[1m]))")
            .time_range(0, 10)
            .step(5)
            .limit(7)
            .build()
            .unwrap();
        let sub = req.with_range(3, 4);
        assert_eq!(sub.query, req.query);
        assert_eq!(sub.step, 5);
        assert_eq!(sub.limit, 7);
        assert_eq!((sub.start, sub.end), (3, 4));
    }

    #[test]
    fn test_result_kind() {
        assert_eq!(Request::instant(r#" {app="foo"} |= "x""#, 0).result_kind(), ResultKind::Streams);
        assert_eq!(Request::instant(r#"rate({app="foo"}[1m])"#, 0).result_kind(), ResultKind::Matrix);
    }

    #[test]
    fn test_series_count_is_distinct() {
        let a = labels(&[("job", "a")]);
        let b = labels(&[("job", "b")]);
        let resp = Response::matrix(vec![
            Series { labels: a.clone(), samples: vec![] },
            Series { labels: b, samples: vec![] },
            Series { labels: a, samples: vec![] },
        ]);
        assert_eq!(resp.series_count(), 2);
        assert_eq!(Response::empty(ResultKind::Streams).series_count(), 0);
    }

    #[test]
    fn test_index_stats_merge() {
        let mut total = IndexStats::with_bytes(10);
        total.merge(&IndexStats { streams: 1, chunks: 2, entries: 3, bytes: 5 });
        assert_eq!(total, IndexStats { streams: 1, chunks: 2, entries: 3, bytes: 15 });
    }

    #[test]
    fn test_format_labels() {
        let l = labels(&[("job", "x"), ("app", "y")]);
        assert_eq!(format_labels(&l), r#"{app="y", job="x"}"#);
    }
}
