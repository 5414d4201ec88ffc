//! Prometheus exposition for `GET /metrics`, plus the JSON view served at
//! `GET /admin/metrics` (§6, §10.E).
//!
//! Rather than pull in a metrics-registry crate, this follows the same
//! shape already used elsewhere in this codebase for dispatch counters:
//! atomic counters behind a small hand-written exposition writer. Counters
//! are per-`event_id`; queue-depth gauges are computed on demand from the
//! store rather than tracked here, since they're a property of the store's
//! current contents, not a monotonic count this process owns.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Per-event counters. All relaxed ordering; callers want throughput, not a
/// consistent cross-counter snapshot.
#[derive(Debug, Default)]
struct EventCounters {
    enrollments_total: AtomicU64,
    rate_limited_total: AtomicU64,
    releases_total: AtomicU64,
    token_verify_ok_total: AtomicU64,
    token_verify_fail_total: AtomicU64,
}

/// A point-in-time read of [`EventCounters`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EventCountersSnapshot {
    pub enrollments_total: u64,
    pub rate_limited_total: u64,
    pub releases_total: u64,
    pub token_verify_ok_total: u64,
    pub token_verify_fail_total: u64,
}

/// One queue-depth gauge reading, supplied by the caller at render time
/// (§10.E: "a queue-depth gauge per event and per tier").
#[derive(Debug, Clone)]
pub struct QueueDepth {
    pub event_id: String,
    pub normal: i64,
    pub high: i64,
}

/// Admission-control counters: enrollments, releases, rate-limit
/// rejections, and token verifications, each labeled by `event_id` and
/// (for verification) outcome.
#[derive(Debug, Default)]
pub struct Metrics {
    per_event: DashMap<String, EventCounters>,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enrollment(&self, event_id: &str) {
        self.per_event
            .entry(event_id.to_owned())
            .or_default()
            .enrollments_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self, event_id: &str) {
        self.per_event
            .entry(event_id.to_owned())
            .or_default()
            .rate_limited_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_releases(&self, event_id: &str, count: u64) {
        if count == 0 {
            return;
        }
        self.per_event
            .entry(event_id.to_owned())
            .or_default()
            .releases_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_token_verify(&self, event_id: &str, ok: bool) {
        let entry = self.per_event.entry(event_id.to_owned()).or_default();
        let counter = if ok {
            &entry.token_verify_ok_total
        } else {
            &entry.token_verify_fail_total
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot one event's counters, or all of them keyed by `event_id`
    /// when `event_id` is `None`.
    #[must_use]
    pub fn snapshot(&self, event_id: Option<&str>) -> Vec<(String, EventCountersSnapshot)> {
        match event_id {
            Some(id) => self
                .per_event
                .get(id)
                .map(|c| (id.to_owned(), snapshot_one(&c)))
                .into_iter()
                .collect(),
            None => self
                .per_event
                .iter()
                .map(|entry| (entry.key().clone(), snapshot_one(&entry)))
                .collect(),
        }
    }

    /// Render every counter, plus the supplied queue-depth gauges, as
    /// Prometheus text exposition format (`text/plain; version=0.0.4`).
    #[must_use]
    pub fn render_prometheus(&self, depths: &[QueueDepth]) -> String {
        let mut out = String::new();

        write_family(
            &mut out,
            "gatekeep_enrollments_total",
            "counter",
            "Total enrollment attempts that reached the queue manager.",
            self.per_event.iter().map(|e| {
                (
                    e.key().clone(),
                    e.enrollments_total.load(Ordering::Relaxed),
                )
            }),
        );
        write_family(
            &mut out,
            "gatekeep_rate_limited_total",
            "counter",
            "Enrollment attempts rejected by the per-device rate limiter.",
            self.per_event.iter().map(|e| {
                (
                    e.key().clone(),
                    e.rate_limited_total.load(Ordering::Relaxed),
                )
            }),
        );
        write_family(
            &mut out,
            "gatekeep_releases_total",
            "counter",
            "Total entries released (admitted and minted a token).",
            self.per_event
                .iter()
                .map(|e| (e.key().clone(), e.releases_total.load(Ordering::Relaxed))),
        );
        write_family_with_label(
            &mut out,
            "gatekeep_token_verifications_total",
            "counter",
            "Admission token verifications, by outcome.",
            "outcome",
            "ok",
            self.per_event.iter().map(|e| {
                (
                    e.key().clone(),
                    e.token_verify_ok_total.load(Ordering::Relaxed),
                )
            }),
        );
        write_family_with_label(
            &mut out,
            "gatekeep_token_verifications_total",
            "counter",
            "Admission token verifications, by outcome.",
            "outcome",
            "failed",
            self.per_event.iter().map(|e| {
                (
                    e.key().clone(),
                    e.token_verify_fail_total.load(Ordering::Relaxed),
                )
            }),
        );

        writeln!(
            out,
            "# HELP gatekeep_queue_depth Current number of waiting entries, by tier."
        )
        .expect("writing to a String cannot fail");
        writeln!(out, "# TYPE gatekeep_queue_depth gauge").expect("writing to a String cannot fail");
        for depth in depths {
            writeln!(
                out,
                "gatekeep_queue_depth{{event_id=\"{}\",tier=\"normal\"}} {}",
                escape_label(&depth.event_id),
                depth.normal
            )
            .expect("writing to a String cannot fail");
            writeln!(
                out,
                "gatekeep_queue_depth{{event_id=\"{}\",tier=\"high\"}} {}",
                escape_label(&depth.event_id),
                depth.high
            )
            .expect("writing to a String cannot fail");
        }

        out
    }
}

fn snapshot_one(counters: &EventCounters) -> EventCountersSnapshot {
    EventCountersSnapshot {
        enrollments_total: counters.enrollments_total.load(Ordering::Relaxed),
        rate_limited_total: counters.rate_limited_total.load(Ordering::Relaxed),
        releases_total: counters.releases_total.load(Ordering::Relaxed),
        token_verify_ok_total: counters.token_verify_ok_total.load(Ordering::Relaxed),
        token_verify_fail_total: counters.token_verify_fail_total.load(Ordering::Relaxed),
    }
}

fn write_family(
    out: &mut String,
    name: &str,
    metric_type: &str,
    help: &str,
    values: impl Iterator<Item = (String, u64)>,
) {
    writeln!(out, "# HELP {name} {help}").expect("writing to a String cannot fail");
    writeln!(out, "# TYPE {name} {metric_type}").expect("writing to a String cannot fail");
    for (event_id, value) in values {
        writeln!(
            out,
            "{name}{{event_id=\"{}\"}} {value}",
            escape_label(&event_id)
        )
        .expect("writing to a String cannot fail");
    }
}

fn write_family_with_label(
    out: &mut String,
    name: &str,
    metric_type: &str,
    help: &str,
    label_name: &str,
    label_value: &str,
    values: impl Iterator<Item = (String, u64)>,
) {
    writeln!(out, "# HELP {name} {help}").expect("writing to a String cannot fail");
    writeln!(out, "# TYPE {name} {metric_type}").expect("writing to a String cannot fail");
    for (event_id, value) in values {
        writeln!(
            out,
            "{name}{{event_id=\"{}\",{label_name}=\"{}\"}} {value}",
            escape_label(&event_id),
            escape_label(label_value)
        )
        .expect("writing to a String cannot fail");
    }
}

/// Escape backslash, double-quote, and newline per the Prometheus text
/// exposition format's label-value escaping rules.
fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_snapshots_per_event() {
        let metrics = Metrics::new();
        metrics.record_enrollment("e1");
        metrics.record_enrollment("e1");
        metrics.record_rate_limited("e1");
        metrics.record_releases("e1", 3);
        metrics.record_token_verify("e1", true);
        metrics.record_token_verify("e1", false);

        let snap = metrics.snapshot(Some("e1"));
        assert_eq!(snap.len(), 1);
        let (_, counters) = &snap[0];
        assert_eq!(counters.enrollments_total, 2);
        assert_eq!(counters.rate_limited_total, 1);
        assert_eq!(counters.releases_total, 3);
        assert_eq!(counters.token_verify_ok_total, 1);
        assert_eq!(counters.token_verify_fail_total, 1);
    }

    #[test]
    fn snapshot_of_unknown_event_is_empty() {
        let metrics = Metrics::new();
        assert!(metrics.snapshot(Some("nope")).is_empty());
    }

    #[test]
    fn prometheus_output_contains_help_and_type_lines() {
        let metrics = Metrics::new();
        metrics.record_enrollment("e1");
        let rendered = metrics.render_prometheus(&[QueueDepth {
            event_id: "e1".into(),
            normal: 4,
            high: 1,
        }]);
        assert!(rendered.contains("# HELP gatekeep_enrollments_total"));
        assert!(rendered.contains("# TYPE gatekeep_enrollments_total counter"));
        assert!(rendered.contains("gatekeep_enrollments_total{event_id=\"e1\"} 1"));
        assert!(rendered.contains("gatekeep_queue_depth{event_id=\"e1\",tier=\"normal\"} 4"));
    }

    #[test]
    fn escapes_label_values() {
        assert_eq!(escape_label("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }
}
