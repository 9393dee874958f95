//! Tracks the display surface frames are copied to and its EGL binding.

use crate::egl::{self as gpu, Egl};
use parking_lot::{Mutex, MutexGuard};
use raw_window_handle::HasWindowHandle;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A platform surface frames can be presented on.
///
/// Equality decides whether a surface message is a change: the same platform
/// surface handed over twice must compare equal.
pub trait OutputSurface: HasWindowHandle + PartialEq {
    /// False once the platform has started tearing the surface down.
    fn is_valid(&self) -> bool;
}

/// Serializes "check validity, draw, swap" on the render thread against the
/// UI thread destroying the platform surface.
///
/// The decoder path never takes it.
#[derive(Debug, Clone, Default)]
pub struct SurfaceGate {
    lock: Arc<Mutex<()>>,
}

impl SurfaceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other holder is mid-blit or mid-teardown.
    pub fn hold(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }
}

/// The EGL surface wrapping the current output, with its size as queried this tick.
pub struct BoundSurface<E: Egl> {
    pub surface: E::Surface,
    pub width: i32,
    pub height: i32,
}

impl<E: Egl> Clone for BoundSurface<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: Egl> Copy for BoundSurface<E> {}

impl<E: Egl> std::fmt::Debug for BoundSurface<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundSurface")
            .field("surface", &self.surface)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

pub struct OutputBinder<E: Egl, S: OutputSurface> {
    target: Option<S>,
    bound: Option<BoundSurface<E>>,
}

impl<E: Egl, S: OutputSurface> Default for OutputBinder<E, S> {
    fn default() -> Self {
        Self {
            target: None,
            bound: None,
        }
    }
}

impl<E: Egl, S: OutputSurface> OutputBinder<E, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self) -> Option<&S> {
        self.target.as_ref()
    }

    pub fn bound(&self) -> Option<BoundSurface<E>> {
        self.bound
    }

    /// Whether `surface` is what is already being presented to.
    pub fn targets(&self, surface: &Option<S>) -> bool {
        self.target == *surface
    }

    /// Records a new output surface and destroys the binding of the old one.
    ///
    /// Handing over the current surface again is a no-op. Returns whether
    /// anything changed. The new binding is only created by [`prepare`](Self::prepare).
    pub fn set_output_surface(&mut self, egl: &E, display: E::Display, surface: Option<S>) -> bool {
        if self.targets(&surface) {
            return false;
        }
        self.invalidate(egl, display);
        debug!(
            "[OUTPUT] Output surface {}",
            if surface.is_some() { "changed" } else { "cleared" }
        );
        self.target = surface;
        true
    }

    /// Returns a binding that is safe to draw to this tick, or `None` to skip it.
    ///
    /// The platform surface's validity is checked on every call; the EGL
    /// surface is created lazily and its size queried each time. Not being
    /// ready yet is not an error.
    pub fn prepare(
        &mut self,
        egl: &E,
        display: E::Display,
        config: E::Config,
    ) -> Option<BoundSurface<E>> {
        let target = self.target.as_ref()?;
        if !target.is_valid() {
            self.invalidate(egl, display);
            return None;
        }

        let surface = match self.bound {
            Some(bound) => bound.surface,
            None => {
                let handle = match target.window_handle() {
                    Ok(handle) => handle,
                    Err(e) => {
                        warn!("[OUTPUT] Output surface has no window handle yet: {}", e);
                        return None;
                    }
                };
                match gpu::create_window_surface(egl, display, config, handle.as_raw()) {
                    Ok(surface) => surface,
                    Err(e) => {
                        warn!("[OUTPUT] Could not bind output surface: {}", e);
                        return None;
                    }
                }
            }
        };

        let previous = self.bound.map(|b| (b.width, b.height));
        self.bound = Some(BoundSurface {
            surface,
            width: 0,
            height: 0,
        });
        let size = egl
            .query_surface(display, surface, khronos_egl::WIDTH)
            .and_then(|w| Ok((w, egl.query_surface(display, surface, khronos_egl::HEIGHT)?)));
        let (width, height) = match size {
            Ok(size) => size,
            Err(code) => {
                warn!("[OUTPUT] Querying output surface size failed: 0x{:x}", code);
                self.invalidate(egl, display);
                return None;
            }
        };

        if previous != Some((width, height)) {
            info!("[OUTPUT] Output bound at {}x{}", width, height);
        }
        let bound = BoundSurface {
            surface,
            width,
            height,
        };
        self.bound = Some(bound);
        if width <= 0 || height <= 0 {
            return None;
        }
        Some(bound)
    }

    /// Destroys the EGL binding but keeps the target, so the next
    /// [`prepare`](Self::prepare) rebinds it.
    pub fn invalidate(&mut self, egl: &E, display: E::Display) {
        if let Some(bound) = self.bound.take() {
            if let Err(code) = egl.destroy_surface(display, bound.surface) {
                warn!("[OUTPUT] eglDestroySurface on output failed: 0x{:x}", code);
            }
        }
    }

    /// Destroys the binding and forgets the target.
    pub fn release(&mut self, egl: &E, display: E::Display) {
        self.invalidate(egl, display);
        self.target = None;
    }
}
