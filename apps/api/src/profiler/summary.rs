//! Read-only view of a session: total time, per-entry share, bottlenecks.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::profiler::session::{Session, TimingNode};

/// How many of the longest entries are reported as bottlenecks.
pub const BOTTLENECK_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct TimingSummary {
    pub name: String,
    /// Seconds from session start to block entry.
    pub start_offset: f64,
    pub end_offset: f64,
    pub duration: f64,
    /// Share of the session's total time. Nested entries double-count.
    pub percentage: f64,
    pub parent: String,
    pub details: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished: bool,
    pub total_time: f64,
    pub timings: Vec<TimingSummary>,
    /// `(name, duration)` pairs, longest first, ties in completion order.
    pub bottlenecks: Vec<(String, f64)>,
    #[serde(skip)]
    pub tree: Vec<TimingNode>,
}

/// Summarises `session` as of `now` (only used while the session is open).
pub fn summarize(session: &Session, now: f64) -> Summary {
    let total_time = match session.end_time {
        Some(end) => end - session.start_time,
        None => now - session.start_time,
    };

    let timings = session
        .timings
        .iter()
        .map(|t| TimingSummary {
            name: t.name.clone(),
            start_offset: t.start_time - session.start_time,
            end_offset: t.end_time - session.start_time,
            duration: t.duration,
            percentage: if total_time > 0.0 {
                t.duration / total_time * 100.0
            } else {
                0.0
            },
            parent: t.parent.clone(),
            details: t.details.clone(),
            depth: t.depth,
        })
        .collect();

    Summary {
        session_id: session.session_id.clone(),
        started_at: session.started_at,
        finished: session.is_finished(),
        total_time,
        timings,
        bottlenecks: rank_bottlenecks(session),
        tree: session.call_tree(),
    }
}

fn rank_bottlenecks(session: &Session) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = session
        .timings
        .iter()
        .map(|t| (t.name.clone(), t.duration))
        .collect();
    // sort_by is stable, so equal durations keep completion order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(BOTTLENECK_COUNT);
    ranked
}

impl Summary {
    /// Human-readable breakdown: the block tree with shares, then the bottlenecks.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Profiling session: {}", self.session_id);
        let _ = writeln!(out, "Total time: {:.4}s", self.total_time);
        let _ = writeln!(out, "Breakdown:");
        for node in &self.tree {
            self.render_node(&mut out, node, 0);
        }
        let _ = writeln!(out, "Top bottlenecks:");
        for (rank, (name, duration)) in self.bottlenecks.iter().enumerate() {
            let _ = writeln!(out, "  {}. {name}: {duration:.4}s", rank + 1);
        }
        out
    }

    fn render_node(&self, out: &mut String, node: &TimingNode, level: usize) {
        let share = if self.total_time > 0.0 {
            node.duration / self.total_time * 100.0
        } else {
            0.0
        };
        let label = format!("{}{}", "  ".repeat(level + 1), node.name);
        let _ = writeln!(
            out,
            "{label:<40} {:>8.4}s ({share:>5.1}%) {}",
            node.duration, node.details
        );
        for child in &node.children {
            self.render_node(out, child, level + 1);
        }
    }
}
