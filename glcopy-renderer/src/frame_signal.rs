//! "A decoded frame is waiting on the texture" flag shared with the decoder thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Render-thread side of the flag: reads and clears it.
#[derive(Debug, Default)]
pub struct FrameAvailability {
    flag: Arc<AtomicBool>,
}

/// Decoder-thread side of the flag: can only raise it.
#[derive(Debug, Clone)]
pub struct FrameNotifier {
    flag: Arc<AtomicBool>,
}

impl FrameAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle for the decoder's frame-available callback.
    pub fn notifier(&self) -> FrameNotifier {
        FrameNotifier {
            flag: Arc::clone(&self.flag),
        }
    }

    /// Whether a frame has landed since the last [`clear`](Self::clear).
    ///
    /// Acquire pairs with the notifier's release store, so everything the
    /// decoder wrote before notifying is visible once this returns true.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl FrameNotifier {
    /// Called from the decoder thread when a new frame is on the texture.
    pub fn notify(&self) {
        self.flag.store(true, Ordering::Release);
    }
}
