//! Async driver of the recording state machine timers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::recording::RecordingController;

/// Call [`RecordingController::tick`] every `period` until `shutdown`
/// turns `true` or its sender is dropped.
///
/// Ticks may close files and wait on the writer, so they run on the
/// blocking pool.
pub async fn run_tick_loop(
    recordings: Arc<RecordingController>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                let recordings = Arc::clone(&recordings);
                if let Err(e) = tokio::task::spawn_blocking(move || recordings.tick()).await {
                    error!(error = %e, "Recording tick panicked");
                }
            }
        }
    }

    debug!("Recording tick loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::recording::RecordingOptions;
    use crate::store::MemoryStore;
    use crate::test_support::MemoryWriter;
    use chrono::Utc;
    use nvr_models::{CodecParams, RecordingState};

    #[test]
    fn test_tick_loop_closes_expired_recording_and_stops() {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemoryStore::new());
        let controller = Arc::new(RecordingController::new(
            Arc::new(MemoryWriter::default()),
            store.clone(),
            Arc::new(clock.clone()),
            root.path(),
        ));
        controller
            .enable(
                "cam1",
                RecordingOptions {
                    pre_buffer_secs: 5,
                    post_buffer_secs: 10,
                    max_file_duration_secs: 300,
                    codec: CodecParams::default(),
                },
            )
            .unwrap();
        controller.ingest_motion_event("cam1", clock.now()).unwrap();
        clock.advance(Duration::from_secs(11));

        tokio_test::block_on(async {
            let (tx, rx) = watch::channel(false);
            let ticks = run_tick_loop(Arc::clone(&controller), Duration::from_millis(10), rx);
            let stop = async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                tx.send(true).unwrap();
            };
            tokio::join!(ticks, stop);
        });

        assert_ne!(controller.get_state("cam1"), RecordingState::Recording);
        assert!(store.recordings()[0].is_complete);
    }
}
