use std::future::Future;

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::progress::{ProgressEstimator, TransferPhase, TransferTracker, PROGRESS_TICK};

/// Drive `upload` to completion while publishing estimated progress.
///
/// Progress climbs in fixed steps up to the cap while the request is
/// pending, jumps to 100 on success and drops back to 0 on failure.
pub async fn run_upload<T, E, F>(tracker: &TransferTracker, upload: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    tracker.begin(TransferPhase::Uploading);

    let mut estimator = ProgressEstimator::new();
    let mut ticker = interval_at(Instant::now() + PROGRESS_TICK, PROGRESS_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(upload);

    let result = loop {
        tokio::select! {
            result = &mut upload => break result,
            _ = ticker.tick() => {
                tracker.set_progress(estimator.tick());
            }
        }
    };

    match &result {
        Ok(_) => tracker.succeed(),
        Err(e) => {
            log::warn!("upload: failed after reaching {}%: {}", estimator.value(), e);
            tracker.fail(e.to_string());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::progress::PROGRESS_CAP;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_progress_climbs_then_completes() {
        let tracker = TransferTracker::new();
        let mut rx = tracker.subscribe();

        let observed = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                seen.push(rx.borrow_and_update().progress);
            }
            seen
        });

        let result: Result<&str, String> = run_upload(&tracker, async {
            tokio::time::sleep(Duration::from_millis(650)).await;
            Ok("done")
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(tracker.current().progress, 100);
        assert_eq!(tracker.current().phase, TransferPhase::Succeeded);

        drop(tracker);
        let seen = observed.await.unwrap();
        assert!(seen.contains(&30));
        assert!(!seen.contains(&40));
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_upload_holds_at_cap() {
        let tracker = TransferTracker::new();
        let mut rx = tracker.subscribe();

        let observed = tokio::spawn(async move {
            let mut highest = 0;
            while rx.changed().await.is_ok() {
                let job = rx.borrow_and_update().clone();
                if job.phase == TransferPhase::Uploading {
                    highest = highest.max(job.progress);
                }
            }
            highest
        });

        let result: Result<(), String> = run_upload(&tracker, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            // Well past the ten ticks needed to reach the cap
            assert_eq!(tracker.current().progress, PROGRESS_CAP);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err("gateway timeout".to_string())
        })
        .await;

        assert!(result.is_err());
        let job = tracker.current();
        assert_eq!(job.phase, TransferPhase::Failed);
        assert_eq!(job.progress, 0);
        assert_eq!(job.error.as_deref(), Some("gateway timeout"));

        drop(tracker);
        assert_eq!(observed.await.unwrap(), PROGRESS_CAP);
    }
}
