//! Diff-based judgment oracle
//!
//! Holds a before/after pair of structural page snapshots and judges whether
//! the change between them satisfies an instruction. Only the step executor
//! takes or clears snapshots.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::agent::{judge_yes_no, Judge, Judgment};
use crate::diagnostics::page_outline;
use crate::error::Result;
use crate::page::PageControl;

const OUTLINE_LIMIT: usize = 12_000;

/// Judges a condition by comparing page snapshots before and after an action
#[async_trait]
pub trait DiffOracle: Send + Sync {
    /// Take a snapshot; the first snapshot after a clear is the baseline
    async fn snapshot(&self, page: &dyn PageControl) -> Result<()>;

    fn clear_snapshots(&self);

    /// Judge the instruction against the baseline and the current page
    async fn assert(&self, page: &dyn PageControl, instruction: &str) -> Result<Judgment>;

    /// Poll `assert` until it passes or the timeout elapses
    async fn wait_for(&self, page: &dyn PageControl, instruction: &str, timeout: Duration) -> Result<bool>;
}

/// [`DiffOracle`] built from DOM outlines and a [`Judge`]
pub struct SnapshotDiffOracle {
    judge: Arc<dyn Judge>,
    snapshots: Mutex<Vec<String>>,
    poll: Duration,
}

impl SnapshotDiffOracle {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self {
            judge,
            snapshots: Mutex::new(Vec::new()),
            poll: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    fn baseline(&self) -> Option<String> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .first()
            .cloned()
    }

    fn record_after(&self, outline: String) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        if snapshots.len() < 2 {
            snapshots.push(outline);
        } else {
            snapshots[1] = outline;
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn diff_prompt(instruction: &str, before: &str, after: &str) -> String {
    format!(
        "You compare two structural snapshots of a web page, taken BEFORE and AFTER a user action.\n\
         Decide whether the change between them (or the AFTER state itself) satisfies this condition:\n\
         \"{}\"\n\n\
         BEFORE:\n{}\n\nAFTER:\n{}\n\n\
         Answer with passed=true only if the condition holds.",
        instruction, before, after
    )
}

#[async_trait]
impl DiffOracle for SnapshotDiffOracle {
    async fn snapshot(&self, page: &dyn PageControl) -> Result<()> {
        let outline = page_outline(page, OUTLINE_LIMIT).await?;
        let mut snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        if snapshots.is_empty() {
            snapshots.push(outline);
        } else {
            snapshots.truncate(1);
            snapshots.push(outline);
        }
        debug!("Diff oracle holds {} snapshot(s)", snapshots.len());
        Ok(())
    }

    fn clear_snapshots(&self) {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    async fn assert(&self, page: &dyn PageControl, instruction: &str) -> Result<Judgment> {
        let after = page_outline(page, OUTLINE_LIMIT).await?;
        let before = self.baseline().unwrap_or_else(|| after.clone());
        let judgment = judge_yes_no(self.judge.as_ref(), &diff_prompt(instruction, &before, &after)).await?;
        self.record_after(after);
        Ok(judgment)
    }

    async fn wait_for(&self, page: &dyn PageControl, instruction: &str, timeout: Duration) -> Result<bool> {
        let started = Instant::now();
        loop {
            if self.assert(page, instruction).await?.passed {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(self.poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockJudge, MockPage};
    use serde_json::json;

    fn page_with_outline(outline: &str) -> MockPage {
        MockPage::new("http://localhost:3000/tasks").with_script("page-outline", json!(outline))
    }

    #[tokio::test]
    async fn test_snapshot_keeps_baseline() {
        let oracle = SnapshotDiffOracle::new(Arc::new(MockJudge::new()));
        let page = page_with_outline("<main>");

        oracle.snapshot(&page).await.unwrap();
        oracle.snapshot(&page).await.unwrap();
        oracle.snapshot(&page).await.unwrap();
        assert_eq!(oracle.snapshot_count(), 2);

        oracle.clear_snapshots();
        assert_eq!(oracle.snapshot_count(), 0);
    }

    #[tokio::test]
    async fn test_assert_asks_judge_with_both_snapshots() {
        let judge = Arc::new(MockJudge::new().with_verdicts(vec![Ok(true)]));
        let oracle = SnapshotDiffOracle::new(judge.clone());
        let page = page_with_outline("<main><li>Buy milk</li></main>");

        oracle.snapshot(&page).await.unwrap();
        let judgment = oracle.assert(&page, "A task is added").await.unwrap();

        assert!(judgment.passed);
        let prompts = judge.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("BEFORE"));
        assert!(prompts[0].contains("A task is added"));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let judge = Arc::new(MockJudge::new().with_verdicts(vec![Ok(false)]));
        let oracle = SnapshotDiffOracle::new(judge).with_poll_interval(Duration::from_millis(1));
        let page = page_with_outline("<main>");

        let appeared = oracle
            .wait_for(&page, "A modal is visible", Duration::from_millis(5))
            .await
            .unwrap();
        assert!(!appeared);
    }
}
