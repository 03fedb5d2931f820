//! The heartbeat loop.
//!
//! The server dictates the cadence in `HELLO`; every beat carries the
//! last seen sequence. The first beat is jittered by a random fraction of
//! the interval so a reconnecting fleet does not beat in unison. When two
//! consecutive beats go unacknowledged the task stops itself, which the
//! shard observes as the internal channel closing and treats as a dead
//! connection.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cord_proto::GatewayPayload;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::shard::SequenceTracker;

/// Beats that may go unacked before the connection is considered dead.
pub const MAX_MISSED_ACKS: u32 = 2;

/// Handle for controlling a running heartbeat task.
#[derive(Debug)]
pub struct HeartbeatHandle {
    running: Arc<AtomicBool>,
    missed_acks: Arc<AtomicU32>,
}

impl HeartbeatHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            missed_acks: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Whether the heartbeat task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consecutive unacknowledged beats.
    #[must_use]
    pub fn missed_acks(&self) -> u32 {
        self.missed_acks.load(Ordering::SeqCst)
    }

    /// Record a `HEARTBEAT_ACK`.
    pub fn ack_received(&self) {
        self.missed_acks.store(0, Ordering::SeqCst);
    }

    /// Stop the heartbeat task.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Start the periodic heartbeat task for one connection.
///
/// Frames are sent into `tx`; the shard's write half forwards them to the
/// socket without passing the command budget. Dropping the receiver stops
/// the task; the task dropping its sender signals a dead connection.
pub fn start_heartbeat_task(
    interval: Duration,
    sequence: Arc<SequenceTracker>,
    tx: mpsc::Sender<GatewayPayload>,
) -> HeartbeatHandle {
    let handle = HeartbeatHandle::new();
    handle.running.store(true, Ordering::SeqCst);

    let running = Arc::clone(&handle.running);
    let missed_acks = Arc::clone(&handle.missed_acks);

    tokio::spawn(async move {
        // Jitter the first beat to avoid a thundering herd.
        let jitter = interval.mul_f64(rand::random::<f64>());
        tokio::time::sleep(jitter).await;

        let mut timer = tokio::time::interval(interval);
        while running.load(Ordering::SeqCst) {
            timer.tick().await;

            if !running.load(Ordering::SeqCst) {
                break;
            }

            if missed_acks.load(Ordering::SeqCst) >= MAX_MISSED_ACKS {
                warn!("two heartbeats unacknowledged, giving up on connection");
                running.store(false, Ordering::SeqCst);
                break;
            }

            let seq = sequence.get();
            trace!(?seq, "heartbeat");
            if tx.send(GatewayPayload::heartbeat(seq)).await.is_err() {
                running.store(false, Ordering::SeqCst);
                break;
            }
            missed_acks.fetch_add(1, Ordering::SeqCst);
        }
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use cord_proto::OpCode;

    #[test]
    fn test_handle_initial_state() {
        let handle = HeartbeatHandle::new();
        assert!(!handle.is_running());
        assert_eq!(handle.missed_acks(), 0);
    }

    #[test]
    fn test_ack_resets_missed_counter() {
        let handle = HeartbeatHandle::new();
        handle.missed_acks.store(2, Ordering::SeqCst);

        handle.ack_received();

        assert_eq!(handle.missed_acks(), 0);
    }

    #[tokio::test]
    async fn test_task_sends_heartbeats_with_sequence() {
        let sequence = Arc::new(SequenceTracker::new());
        sequence.observe(42);
        let (tx, mut rx) = mpsc::channel(8);

        let handle = start_heartbeat_task(Duration::from_millis(10), sequence, tx);

        let frame = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timed out waiting for heartbeat")
            .expect("channel closed");
        assert_eq!(frame.op, OpCode::Heartbeat);
        assert_eq!(frame.d, serde_json::json!(42));

        handle.stop();
    }

    #[tokio::test]
    async fn test_task_stops_after_two_missed_acks() {
        let sequence = Arc::new(SequenceTracker::new());
        let (tx, mut rx) = mpsc::channel(8);

        let handle = start_heartbeat_task(Duration::from_millis(5), sequence, tx);

        // Drain beats without ever acking; the channel must close.
        let mut beats = 0;
        while tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .ok()
            .flatten()
            .is_some()
        {
            beats += 1;
        }

        assert_eq!(beats, MAX_MISSED_ACKS);
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_acked_task_keeps_beating() {
        let sequence = Arc::new(SequenceTracker::new());
        let (tx, mut rx) = mpsc::channel(8);

        let handle = start_heartbeat_task(Duration::from_millis(5), sequence, tx);

        for _ in 0..4 {
            let beat = tokio::time::timeout(Duration::from_millis(500), rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            assert_eq!(beat.op, OpCode::Heartbeat);
            handle.ack_received();
        }

        assert!(handle.is_running());
        handle.stop();
    }
}
