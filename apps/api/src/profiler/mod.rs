//! Request profiler: a registry of timing sessions, one per traced request.
//!
//! A handler opens a session with [`Profiler::start_session`], runs its work
//! inside [`Profiler::scope`] so that [`time_block`] calls anywhere down the
//! call chain land in that session, then closes it and reads the [`Summary`].
//!
//! The active session is bound to the request's task (tokio task-local), so
//! concurrent requests never record into each other's sessions. Profiling
//! never fails the request: a missing session or a poisoned lock turns every
//! operation into a no-op.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::{debug, warn};

pub mod block;
pub mod session;
pub mod summary;

pub use block::{time_block, timed};
pub use session::Session;
pub use summary::{summarize, Summary};

pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Clone)]
struct ActiveSession {
    id: String,
    handle: SessionHandle,
}

tokio::task_local! {
    static CURRENT_SESSION: Option<ActiveSession>;
}

/// Handle of the session bound to the current task, if any.
pub(crate) fn current_handle() -> Option<SessionHandle> {
    CURRENT_SESSION
        .try_with(|active| active.as_ref().map(|a| a.handle.clone()))
        .ok()
        .flatten()
}

/// Id of the session bound to the current task, if any.
pub fn current_session_id() -> Option<String> {
    CURRENT_SESSION
        .try_with(|active| active.as_ref().map(|a| a.id.clone()))
        .ok()
        .flatten()
}

/// Process-wide session registry, bounded by least-recently-used eviction.
pub struct Profiler {
    sessions: Mutex<LruCache<String, SessionHandle>>,
}

impl Profiler {
    pub fn new(max_sessions: usize) -> Self {
        let capacity = NonZeroUsize::new(max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Creates a session keyed by `session_id`. An existing session with the
    /// same id is replaced; blocks still holding the old one keep writing to it.
    pub fn start_session(&self, session_id: &str) -> String {
        let handle = Arc::new(Mutex::new(Session::new(session_id)));
        if let Ok(mut sessions) = self.sessions.lock() {
            match sessions.push(session_id.to_string(), handle) {
                Some((old_id, _)) if old_id == session_id => {
                    warn!("Profiling session {session_id} already existed; replaced");
                }
                Some((evicted, _)) => {
                    debug!("Evicted profiling session {evicted}");
                }
                None => {}
            }
        }
        session_id.to_string()
    }

    /// Closes the session. `None` means the current task's session.
    /// Unknown ids and already-closed sessions are left alone.
    pub fn end_session(&self, session_id: Option<&str>) {
        if let Some(handle) = self.lookup(session_id) {
            if let Ok(mut guard) = handle.lock() {
                guard.end(session::now());
            };
        }
    }

    /// Summary of the session as it stands now. `None` if the session is unknown.
    pub fn get_session_summary(&self, session_id: Option<&str>) -> Option<Summary> {
        let handle = self.lookup(session_id)?;
        let guard = handle.lock().ok()?;
        Some(summarize(&guard, session::now()))
    }

    /// Runs `fut` with `session_id` as the task's current session. If the
    /// session is unknown the future still runs, with profiling disabled.
    pub async fn scope<F: Future>(&self, session_id: &str, fut: F) -> F::Output {
        let active = self.handle(session_id).map(|handle| ActiveSession {
            id: session_id.to_string(),
            handle,
        });
        CURRENT_SESSION.scope(active, fut).await
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn handle(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().ok()?.get(session_id).cloned()
    }

    fn lookup(&self, session_id: Option<&str>) -> Option<SessionHandle> {
        match session_id {
            Some(id) => self.handle(id),
            None => current_handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_nested_scenario_records_completion_order() {
        let profiler = Profiler::new(16);
        let id = profiler.start_session("abc123");

        profiler
            .scope(&id, async {
                let _a = time_block("A");
                {
                    let _b = time_block("B").with_parent("A");
                    std::thread::sleep(Duration::from_millis(50));
                }
                std::thread::sleep(Duration::from_millis(50));
            })
            .await;
        profiler.end_session(Some(&id));

        let summary = profiler.get_session_summary(Some(&id)).unwrap();
        assert!(summary.finished);
        assert!(summary.total_time >= 0.1, "total {}", summary.total_time);
        assert!(summary.total_time < 0.5, "total {}", summary.total_time);

        let names: Vec<&str> = summary.timings.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(summary.timings[0].parent, "A");
        assert_eq!(summary.timings[1].parent, "");

        let ranked: Vec<&str> = summary.bottlenecks.iter().map(|b| b.0.as_str()).collect();
        assert_eq!(ranked, vec!["A", "B"]);
        assert!(summary.bottlenecks[0].1 >= 0.1);
        assert!(summary.bottlenecks[1].1 >= 0.05);
    }

    #[tokio::test]
    async fn test_every_block_recorded_once() {
        let profiler = Profiler::new(16);
        let id = profiler.start_session("many");

        profiler
            .scope(&id, async {
                for i in 0..4 {
                    let _outer = time_block(format!("outer-{i}"));
                    let _inner = time_block(format!("inner-{i}"));
                }
                let _last = time_block("last");
            })
            .await;
        profiler.end_session(Some(&id));

        let summary = profiler.get_session_summary(Some(&id)).unwrap();
        assert_eq!(summary.timings.len(), 9);
        assert!(summary.timings.iter().all(|t| t.duration >= 0.0));
        let top_level: f64 = summary
            .timings
            .iter()
            .filter(|t| t.parent.is_empty())
            .map(|t| t.percentage)
            .sum();
        assert!(top_level <= 100.0 + 1e-6);
    }

    #[test]
    fn test_unknown_session_summary_is_none() {
        let profiler = Profiler::new(4);
        assert!(profiler.get_session_summary(Some("missing")).is_none());
        assert!(profiler.get_session_summary(None).is_none());
    }

    #[test]
    fn test_block_without_session_is_noop() {
        let block = time_block("orphan").with_details("nothing to record");
        assert!(!block.is_recording());
        drop(block);
        assert!(current_session_id().is_none());
    }

    #[tokio::test]
    async fn test_scope_with_unknown_session_still_runs() {
        let profiler = Profiler::new(4);
        let value = profiler
            .scope("ghost", async {
                let block = time_block("work");
                assert!(!block.is_recording());
                7
            })
            .await;
        assert_eq!(value, 7);
        assert_eq!(profiler.session_count(), 0);
    }

    #[test]
    fn test_end_session_twice_keeps_first_end_time() {
        let profiler = Profiler::new(4);
        profiler.start_session("twice");
        profiler.end_session(Some("twice"));
        let first = profiler.get_session_summary(Some("twice")).unwrap().total_time;

        std::thread::sleep(Duration::from_millis(10));
        profiler.end_session(Some("twice"));
        let second = profiler.get_session_summary(Some("twice")).unwrap().total_time;
        assert_eq!(first, second);
    }

    #[test]
    fn test_end_unknown_session_is_noop() {
        let profiler = Profiler::new(4);
        profiler.end_session(Some("nobody"));
        profiler.end_session(None);
        assert_eq!(profiler.session_count(), 0);
    }

    #[tokio::test]
    async fn test_current_session_defaults_inside_scope() {
        let profiler = Profiler::new(4);
        profiler.start_session("implicit");

        profiler
            .scope("implicit", async {
                assert_eq!(current_session_id().as_deref(), Some("implicit"));
                let _work = time_block("work");
                assert!(profiler.get_session_summary(None).is_some());
            })
            .await;
        profiler
            .scope("implicit", async { profiler.end_session(None) })
            .await;

        let summary = profiler.get_session_summary(Some("implicit")).unwrap();
        assert!(summary.finished);
        assert_eq!(summary.timings.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_do_not_cross() {
        let profiler = Arc::new(Profiler::new(16));
        let mut tasks = Vec::new();

        for id in ["left", "right"] {
            let profiler = profiler.clone();
            tasks.push(tokio::spawn(async move {
                profiler.start_session(id);
                profiler
                    .scope(id, async {
                        for step in 0..3 {
                            let _block = time_block(format!("{id}-{step}"));
                            tokio::time::sleep(Duration::from_millis(5)).await;
                        }
                    })
                    .await;
                profiler.end_session(Some(id));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for id in ["left", "right"] {
            let summary = profiler.get_session_summary(Some(id)).unwrap();
            assert_eq!(summary.timings.len(), 3);
            assert!(summary.timings.iter().all(|t| t.name.starts_with(id)));
        }
    }

    #[tokio::test]
    async fn test_block_recorded_when_wrapped_code_fails() {
        let profiler = Profiler::new(4);
        profiler.start_session("fails");

        fn parse_step() -> Result<u32, String> {
            Err("boom".to_string())
        }

        async fn failing() -> Result<u32, String> {
            let _block = time_block("failing step");
            let value = parse_step()?;
            Ok(value + 1)
        }

        let result = profiler.scope("fails", failing()).await;
        assert_eq!(result, Err("boom".to_string()));

        let summary = profiler.get_session_summary(Some("fails")).unwrap();
        assert_eq!(summary.timings[0].name, "failing step");
    }

    #[test]
    fn test_block_recorded_when_wrapped_code_panics() {
        let profiler = Profiler::new(4);
        profiler.start_session("panics");
        let active = profiler.handle("panics").map(|handle| ActiveSession {
            id: "panics".to_string(),
            handle,
        });

        let outcome = CURRENT_SESSION.sync_scope(active, || {
            std::panic::catch_unwind(|| {
                let _block = time_block("panicking step");
                panic!("wrapped failure");
            })
        });
        assert!(outcome.is_err());

        let summary = profiler.get_session_summary(Some("panics")).unwrap();
        assert_eq!(summary.timings.len(), 1);
        assert_eq!(summary.timings[0].name, "panicking step");
    }

    #[tokio::test]
    async fn test_timed_wraps_future() {
        let profiler = Profiler::new(4);
        profiler.start_session("timed");
        let out = profiler
            .scope("timed", timed("compute", async { 21 * 2 }))
            .await;
        assert_eq!(out, 42);

        let summary = profiler.get_session_summary(Some("timed")).unwrap();
        assert_eq!(summary.timings[0].name, "compute");
    }

    #[test]
    fn test_id_collision_replaces_session() {
        let profiler = Profiler::new(4);
        profiler.start_session("dup");
        let first = profiler.handle("dup").unwrap();
        first.lock().unwrap().add_timing("stale", 0.0, 1.0, "", "");

        profiler.start_session("dup");
        assert_eq!(profiler.session_count(), 1);
        let summary = profiler.get_session_summary(Some("dup")).unwrap();
        assert!(summary.timings.is_empty());
    }

    #[test]
    fn test_registry_evicts_least_recently_used() {
        let profiler = Profiler::new(2);
        profiler.start_session("one");
        profiler.start_session("two");
        assert!(profiler.get_session_summary(Some("one")).is_some());
        profiler.start_session("three");

        assert_eq!(profiler.session_count(), 2);
        assert!(profiler.get_session_summary(Some("two")).is_none());
        assert!(profiler.get_session_summary(Some("one")).is_some());
        assert!(profiler.get_session_summary(Some("three")).is_some());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let profiler = Profiler::new(0);
        profiler.start_session("only");
        assert_eq!(profiler.session_count(), 1);
    }
}
