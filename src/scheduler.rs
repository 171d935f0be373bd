use crate::models::{ChapterOutcome, DownloadTask};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Admission gate bounding how many chapters are in flight at once.
pub struct Scheduler {
    limit: usize,
    show_progress: bool,
}

impl Scheduler {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            show_progress: true,
        }
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("Downloading chapters");
        pb
    }

    /// Submit every task at once and run `job` for each, at most `limit`
    /// concurrently. Waiting tasks are admitted in submission order.
    /// Outcomes come back in submission order.
    pub async fn run_all<F, Fut>(&self, tasks: Vec<DownloadTask>, job: F) -> Vec<ChapterOutcome>
    where
        F: Fn(DownloadTask) -> Fut,
        Fut: Future<Output = ChapterOutcome>,
    {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let pb = self.progress_bar(total);

        let mut in_flight = FuturesUnordered::new();
        for (index, task) in tasks.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let pb = &pb;
            let job = &job;
            in_flight.push(async move {
                // The semaphore is never closed, so acquisition cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                debug!("[SCHEDULER] Chapter {} admitted", task.chapter.label());
                let outcome = job(task).await;
                pb.inc(1);
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<ChapterOutcome>> = vec![None; total];
        while let Some((index, outcome)) = in_flight.next().await {
            outcomes[index] = Some(outcome);
        }
        pb.finish_with_message("Done");

        outcomes.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chapter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn tasks(count: usize) -> Vec<DownloadTask> {
        (1..=count)
            .map(|n| DownloadTask::new("alpha", Chapter::new(n as f64, format!("u{}", n))))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_limit() {
        let active = &AtomicUsize::new(0);
        let peak = &AtomicUsize::new(0);

        let outcomes = Scheduler::new(3)
            .without_progress()
            .run_all(tasks(10), move |_task| async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                ChapterOutcome::Skipped
            })
            .await;

        assert_eq!(outcomes.len(), 10);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_follow_submission_order() {
        let outcomes = Scheduler::new(4)
            .without_progress()
            .run_all(tasks(4), |task| async move {
                // Later chapters finish first.
                let n = task.chapter.number as u64;
                tokio::time::sleep(Duration::from_millis(100 - n * 10)).await;
                ChapterOutcome::Failed { reason: task.chapter.label() }
            })
            .await;

        let reasons: Vec<String> = outcomes
            .into_iter()
            .map(|o| match o {
                ChapterOutcome::Failed { reason } => reason,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(reasons, vec!["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn empty_batch_returns_nothing() {
        let outcomes = Scheduler::new(3)
            .without_progress()
            .run_all(Vec::new(), |_task| async { ChapterOutcome::Skipped })
            .await;
        assert!(outcomes.is_empty());
    }
}
