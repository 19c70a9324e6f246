// src/engine/ticker.rs

//! Background task that turns the timetable into run requests.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{RuntimeEvent, TriggerReason};
use crate::schedule::{Timetable, MAX_BACKFILL};

/// Spawn the timetable ticker.
///
/// Every due logical date is sent as [`RuntimeEvent::RunRequested`]; once the
/// timetable has no further occurrence [`RuntimeEvent::TimetableExhausted`] is
/// sent and the ticker stops. It also stops when the runtime goes away.
pub fn spawn_ticker(
    timetable: Timetable,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            start_date = %timetable.start_date,
            schedule = %timetable.cadence,
            catchup = timetable.catchup,
            "timetable ticker started"
        );

        let mut last: Option<DateTime<Utc>> = None;

        loop {
            let now = Utc::now();
            let due = timetable.due_runs(last, now);
            let capped = due.len() == MAX_BACKFILL;

            for logical_date in due {
                let event = RuntimeEvent::RunRequested {
                    logical_date,
                    reason: TriggerReason::Timetable,
                };
                if runtime_tx.send(event).await.is_err() {
                    debug!("runtime gone; stopping ticker");
                    return;
                }
                last = Some(logical_date);
            }

            if capped {
                continue;
            }

            if timetable.is_exhausted(last) {
                info!("timetable exhausted; no further runs will be scheduled");
                let _ = runtime_tx.send(RuntimeEvent::TimetableExhausted).await;
                return;
            }

            let Some(next) = timetable.next_after(last.map_or(now, |l| l.max(now))) else {
                let _ = runtime_tx.send(RuntimeEvent::TimetableExhausted).await;
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            debug!(next = %next, ?wait, "sleeping until next scheduled run");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = runtime_tx.closed() => {
                    debug!("runtime gone; stopping ticker");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::schedule::Cadence;

    #[tokio::test]
    async fn interval_past_the_calendar_exhausts_after_first_run() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let cadence: Cadence = "@every 100000000d".parse().unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let ticker = spawn_ticker(Timetable::new(start, cadence, false), tx);

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(
            first,
            Some(RuntimeEvent::RunRequested { logical_date, reason: TriggerReason::Timetable })
                if logical_date == start
        ));
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(second, Some(RuntimeEvent::TimetableExhausted)));

        ticker.await.unwrap();
    }
}
