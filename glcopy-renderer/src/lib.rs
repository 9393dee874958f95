//! Copies hardware-decoded video frames from an off-screen external texture to
//! a display surface with EGL and GLES2.

pub mod config;
pub mod copier;
pub mod egl;
pub mod error;
pub mod frame_signal;
pub mod gles;
pub mod output;
pub mod program;
pub mod renderer;

#[cfg(test)]
mod mock;

pub use config::{ConfigError, RendererConfig, SurfaceFormat};
pub use copier::{FrameCopier, OutputStep, RenderState};
pub use egl::{Egl, KhronosEgl, RenderingContext};
pub use error::{GlError, PlaybackError, ShaderKind};
pub use frame_signal::{FrameAvailability, FrameNotifier};
pub use gles::Gles;
pub use output::{OutputBinder, OutputSurface, SurfaceGate};
pub use program::BlitProgram;
pub use renderer::{
    CopyStats, DecoderSurfaceProvider, ExternalTexture, GlVideoRenderer, VideoRenderer,
};
