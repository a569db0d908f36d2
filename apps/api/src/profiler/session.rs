//! Session state: one request trace made of completed timing entries.

use std::sync::OnceLock;
use std::time::Instant;

use chrono::{DateTime, Utc};

/// Seconds elapsed on the process-wide monotonic clock.
pub fn now() -> f64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// One completed measurement.
#[derive(Debug, Clone)]
pub struct TimingEntry {
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    /// Display label of the enclosing block. Empty for top-level entries.
    pub parent: String,
    pub details: String,
    /// Block id assigned when the block was entered.
    pub block_id: u64,
    /// Block id of the innermost block open when this one was entered.
    pub parent_id: Option<u64>,
    pub depth: usize,
}

/// A block that has been entered but not yet recorded.
#[derive(Debug, Clone)]
struct OpenBlock {
    id: u64,
    name: String,
}

/// Handle to an entered block, returned by [`Session::open_block`].
#[derive(Debug, Clone)]
pub struct BlockTicket {
    pub id: u64,
    pub parent: String,
    pub parent_id: Option<u64>,
    pub depth: usize,
}

#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub start_time: f64,
    /// `None` while the session is open.
    pub end_time: Option<f64>,
    /// Completion order: a block lands here when it ends.
    pub timings: Vec<TimingEntry>,
    open: Vec<OpenBlock>,
    next_block_id: u64,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::starting_at(session_id, now())
    }

    pub fn starting_at(session_id: impl Into<String>, start_time: f64) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            start_time,
            end_time: None,
            timings: Vec::new(),
            open: Vec::new(),
            next_block_id: 0,
        }
    }

    /// Stamps `end_time` on first close; later calls leave it untouched.
    pub fn end(&mut self, at: f64) {
        if self.end_time.is_none() {
            self.end_time = Some(at);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Pushes a block onto the open stack. Without an explicit parent label
    /// the innermost open block's name is used.
    pub fn open_block(&mut self, name: &str, parent: Option<&str>) -> BlockTicket {
        let id = self.next_block_id;
        self.next_block_id += 1;

        let enclosing = self.open.last();
        let ticket = BlockTicket {
            id,
            parent: match parent {
                Some(label) => label.to_string(),
                None => enclosing.map(|b| b.name.clone()).unwrap_or_default(),
            },
            parent_id: enclosing.map(|b| b.id),
            depth: self.open.len(),
        };

        self.open.push(OpenBlock {
            id,
            name: name.to_string(),
        });
        ticket
    }

    /// Pops the block (wherever it sits on the stack) and appends its entry.
    pub fn close_block(
        &mut self,
        ticket: BlockTicket,
        name: String,
        start: f64,
        end: f64,
        details: String,
    ) {
        if let Some(pos) = self.open.iter().rposition(|b| b.id == ticket.id) {
            self.open.remove(pos);
        }
        self.timings.push(TimingEntry {
            name,
            start_time: start,
            end_time: end,
            duration: (end - start).max(0.0),
            parent: ticket.parent,
            details,
            block_id: ticket.id,
            parent_id: ticket.parent_id,
            depth: ticket.depth,
        });
    }

    /// Records a measurement that did not go through the open-block stack.
    #[cfg(test)]
    pub fn add_timing(&mut self, name: &str, start: f64, end: f64, parent: &str, details: &str) {
        let id = self.next_block_id;
        self.next_block_id += 1;
        self.timings.push(TimingEntry {
            name: name.to_string(),
            start_time: start,
            end_time: end,
            duration: (end - start).max(0.0),
            parent: parent.to_string(),
            details: details.to_string(),
            block_id: id,
            parent_id: None,
            depth: usize::from(!parent.is_empty()),
        });
    }

    #[cfg(test)]
    pub fn open_depth(&self) -> usize {
        self.open.len()
    }

    /// Rebuilds the block tree from structural parent ids, children ordered by start.
    pub fn call_tree(&self) -> Vec<TimingNode> {
        let mut by_start: Vec<&TimingEntry> = self.timings.iter().collect();
        by_start.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        fn build(parent: Option<u64>, entries: &[&TimingEntry]) -> Vec<TimingNode> {
            entries
                .iter()
                .filter(|e| e.parent_id == parent)
                .map(|e| TimingNode {
                    name: e.name.clone(),
                    duration: e.duration,
                    details: e.details.clone(),
                    children: build(Some(e.block_id), entries),
                })
                .collect()
        }

        // Entries whose structural parent never completed are promoted to roots.
        let known: Vec<u64> = self.timings.iter().map(|e| e.block_id).collect();
        let mut roots = build(None, &by_start);
        for orphan in by_start
            .iter()
            .filter(|e| matches!(e.parent_id, Some(p) if !known.contains(&p)))
        {
            roots.push(TimingNode {
                name: orphan.name.clone(),
                duration: orphan.duration,
                details: orphan.details.clone(),
                children: build(Some(orphan.block_id), &by_start),
            });
        }
        roots
    }
}

/// A node of the reconstructed block tree.
#[derive(Debug, Clone)]
pub struct TimingNode {
    pub name: String,
    pub duration: f64,
    pub details: String,
    pub children: Vec<TimingNode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_timing_computes_duration() {
        let mut session = Session::starting_at("s", 0.0);
        session.add_timing("load", 1.0, 1.25, "", "");
        assert_eq!(session.timings.len(), 1);
        assert!((session.timings[0].duration - 0.25).abs() < 1e-9);
        assert_eq!(session.timings[0].depth, 0);
    }

    #[test]
    fn test_duration_never_negative() {
        let mut session = Session::starting_at("s", 0.0);
        session.add_timing("skewed", 2.0, 1.0, "", "");
        assert_eq!(session.timings[0].duration, 0.0);
    }

    #[test]
    fn test_open_block_inherits_innermost_name() {
        let mut session = Session::starting_at("s", 0.0);
        let outer = session.open_block("outer", None);
        let inner = session.open_block("inner", None);

        assert_eq!(outer.parent, "");
        assert_eq!(outer.depth, 0);
        assert_eq!(inner.parent, "outer");
        assert_eq!(inner.parent_id, Some(outer.id));
        assert_eq!(inner.depth, 1);
        assert_eq!(session.open_depth(), 2);
    }

    #[test]
    fn test_explicit_parent_label_overrides_stack() {
        let mut session = Session::starting_at("s", 0.0);
        let outer = session.open_block("outer", None);
        let labelled = session.open_block("parsing", Some("service"));
        assert_eq!(labelled.parent, "service");
        assert_eq!(labelled.parent_id, Some(outer.id));
    }

    #[test]
    fn test_close_out_of_order_keeps_stack_consistent() {
        let mut session = Session::starting_at("s", 0.0);
        let a = session.open_block("a", None);
        let b = session.open_block("b", None);
        session.close_block(a, "a".into(), 0.0, 1.0, String::new());
        assert_eq!(session.open_depth(), 1);

        let c = session.open_block("c", None);
        assert_eq!(c.parent, "b");
        session.close_block(c, "c".into(), 1.0, 1.5, String::new());
        session.close_block(b, "b".into(), 0.5, 2.0, String::new());
        assert_eq!(session.open_depth(), 0);

        let names: Vec<&str> = session.timings.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_end_is_idempotent() {
        let mut session = Session::starting_at("s", 0.0);
        session.end(1.0);
        session.end(5.0);
        assert_eq!(session.end_time, Some(1.0));
        assert!(session.is_finished());
    }

    #[test]
    fn test_call_tree_nests_by_block_id() {
        let mut session = Session::starting_at("s", 0.0);
        let root = session.open_block("request", None);
        let child = session.open_block("service", None);
        let leaf = session.open_block("call", None);
        session.close_block(leaf, "call".into(), 0.2, 0.3, String::new());
        session.close_block(child, "service".into(), 0.1, 0.4, String::new());
        session.close_block(root, "request".into(), 0.0, 0.5, String::new());

        let tree = session.call_tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "request");
        assert_eq!(tree[0].children[0].name, "service");
        assert_eq!(tree[0].children[0].children[0].name, "call");
    }

    #[test]
    fn test_call_tree_promotes_orphans() {
        let mut session = Session::starting_at("s", 0.0);
        let _still_open = session.open_block("never-closed", None);
        let child = session.open_block("child", None);
        session.close_block(child, "child".into(), 0.0, 0.1, String::new());

        let tree = session.call_tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "child");
    }
}
