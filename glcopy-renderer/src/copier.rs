//! Frame copy state machine.
//!
//! The decoder is asked to render one output buffer onto the off-screen
//! texture, the frame is imported once it lands, then copied to the display on
//! a later tick. Only the render thread mutates this; the decoder reaches it
//! through the [`FrameNotifier`](crate::frame_signal::FrameNotifier).

use crate::frame_signal::{FrameAvailability, FrameNotifier};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    AwaitingDecoderRender,
    FrameReady,
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderState::Idle => f.write_str("idle"),
            RenderState::AwaitingDecoderRender => f.write_str("awaiting decoder render"),
            RenderState::FrameReady => f.write_str("frame ready"),
        }
    }
}

/// What the output-buffer hook should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStep {
    /// A requested frame landed; latch it into the texture.
    ImportFrame,
    /// Nothing pending; ask the decoder for the next buffer.
    RequestRender,
    /// Still waiting on the decoder, or a frame is waiting to be copied.
    Hold,
}

#[derive(Debug, Default)]
pub struct FrameCopier {
    frames: FrameAvailability,
    awaiting: bool,
}

impl FrameCopier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifier(&self) -> FrameNotifier {
        self.frames.notifier()
    }

    pub fn state(&self) -> RenderState {
        match (self.awaiting, self.frames.is_set()) {
            (true, false) => RenderState::AwaitingDecoderRender,
            (true, true) => RenderState::FrameReady,
            (false, _) => RenderState::Idle,
        }
    }

    pub fn next_output_step(&self) -> OutputStep {
        match (self.awaiting, self.frames.is_set()) {
            (true, true) => OutputStep::ImportFrame,
            (false, false) => OutputStep::RequestRender,
            _ => OutputStep::Hold,
        }
    }

    /// The decoder accepted a render-to-surface request.
    pub fn render_requested(&mut self) {
        self.awaiting = true;
    }

    /// The landed frame was latched into the texture.
    pub fn frame_imported(&mut self) {
        self.awaiting = false;
    }

    /// Idle with an imported frame that has not been copied yet.
    pub fn blit_due(&self) -> bool {
        !self.awaiting && self.frames.is_set()
    }

    pub fn blit_done(&mut self) {
        self.frames.clear();
    }

    /// Drops any pending request and any signalled frame.
    pub fn reset(&mut self) {
        self.awaiting = false;
        self.frames.clear();
    }
}
