//! Shared helpers for lingo integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::Semaphore;

use lingo::{Database, ManualClock, SegmentResult, TranslateError, TranslationStore, Translator};

pub const LEASE: Duration = Duration::from_secs(30);

/// A store on a real database file inside a temp directory.
pub struct TestHarness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub store: TranslationStore,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
                .single()
                .expect("valid start"),
        ));
        let store = open_store(&dir.path().join("lingo.db")).with_clock(clock.clone());
        Self { dir, clock, store }
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("lingo.db")
    }

    /// A second, independent connection to the same file sharing this
    /// harness's clock.
    pub fn second_store(&self) -> TranslationStore {
        open_store(&self.db_path()).with_clock(self.clock.clone())
    }
}

pub fn open_store(path: &std::path::Path) -> TranslationStore {
    TranslationStore::new(Database::open(path, Duration::from_secs(5)).expect("open database"))
}

pub fn seg(text: &str) -> SegmentResult {
    SegmentResult::new(text, format!("py({})", text), format!("EN({})", text))
}

/// Splits on whitespace and wraps each piece in `EN(...)`.
///
/// With `gated`, every `translate` call waits for a permit from
/// [`ScriptedTranslator::release`], so a test controls exactly how far a
/// job gets.
#[derive(Default)]
pub struct ScriptedTranslator {
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTranslator {
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn segment(&self, text: &str) -> Result<Vec<String>, TranslateError> {
        Ok(text.split_whitespace().map(str::to_string).collect())
    }

    async fn translate(&self, segment: &str, _context: &str) -> Result<SegmentResult, TranslateError> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| TranslateError::Unavailable(e.to_string()))?;
            permit.forget();
        }
        self.calls.lock().unwrap().push(segment.to_string());
        Ok(seg(segment))
    }
}

/// Polls `check` until it returns true or about two seconds pass.
pub async fn wait_until<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
