use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use derive_more::Display;
use types::phase0::primitives::Slot;

pub static NODE_STATUS: NodeStatus = NodeStatus::new();

#[derive(Display, Debug)]
#[display("head slot: {head_slot:?}, synced: {is_synced:?}")]
pub struct NodeStatus {
    head_slot: AtomicU64,
    is_synced: AtomicBool,
}

impl NodeStatus {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head_slot: AtomicU64::new(0),
            is_synced: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn head_slot(&self) -> Slot {
        self.head_slot.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.is_synced.load(Ordering::Relaxed)
    }

    pub fn set_head_slot(&self, head_slot: Slot) {
        self.head_slot.store(head_slot, Ordering::Relaxed)
    }

    pub fn set_synced(&self, is_synced: bool) {
        self.is_synced.store(is_synced, Ordering::Relaxed)
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[macro_export]
macro_rules! info_with_status {
    ($($arg:tt)*) => {
        ::tracing::info!("[{}] {}", $crate::NODE_STATUS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! debug_with_status {
    ($($arg:tt)*) => {
        ::tracing::debug!("[{}] {}", $crate::NODE_STATUS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! warn_with_status {
    ($($arg:tt)*) => {
        ::tracing::warn!("[{}] {}", $crate::NODE_STATUS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! trace_with_status {
    ($($arg:tt)*) => {
        ::tracing::trace!("[{}] {}", $crate::NODE_STATUS, format_args!($($arg)*));
    };
}
