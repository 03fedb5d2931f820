//! Shard connection states.

use std::sync::atomic::{AtomicU32, Ordering};

/// State of a shard's gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Not connected.
    Disconnected,
    /// Opening the socket and waiting for `HELLO`.
    Connecting,
    /// `IDENTIFY` sent, waiting for `READY`.
    Identifying,
    /// `RESUME` sent, replay in progress.
    Resuming,
    /// Session live, event loop running.
    Ready,
    /// Connection lost, reconnect pending.
    Reconnecting,
    /// Terminal: killed or failed fatally.
    Dead,
}

/// Atomic wrapper for a shard state.
#[derive(Debug)]
pub struct AtomicShardState(AtomicU32);

impl AtomicShardState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: ShardState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> ShardState {
        match self.0.load(Ordering::SeqCst) {
            0 => ShardState::Disconnected,
            1 => ShardState::Connecting,
            2 => ShardState::Identifying,
            3 => ShardState::Resuming,
            4 => ShardState::Ready,
            5 => ShardState::Reconnecting,
            _ => ShardState::Dead,
        }
    }

    /// Store a new state.
    pub fn store(&self, state: ShardState) {
        self.0.store(state as u32, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_state_discriminants() {
        assert_eq!(ShardState::Disconnected as u32, 0);
        assert_eq!(ShardState::Connecting as u32, 1);
        assert_eq!(ShardState::Identifying as u32, 2);
        assert_eq!(ShardState::Resuming as u32, 3);
        assert_eq!(ShardState::Ready as u32, 4);
        assert_eq!(ShardState::Reconnecting as u32, 5);
        assert_eq!(ShardState::Dead as u32, 6);
    }

    #[test]
    fn test_atomic_shard_state() {
        let state = AtomicShardState::new(ShardState::Disconnected);
        assert_eq!(state.load(), ShardState::Disconnected);

        state.store(ShardState::Identifying);
        assert_eq!(state.load(), ShardState::Identifying);

        state.store(ShardState::Dead);
        assert_eq!(state.load(), ShardState::Dead);
    }
}
