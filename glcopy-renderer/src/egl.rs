//! GPU context management: display, context, off-screen surface and focus.

use crate::config::RendererConfig;
use crate::error::{EglCode, GlError};
use crate::gles::Gles;
use khronos_egl as egl;
use raw_window_handle::RawWindowHandle;
use std::fmt;
use tracing::{debug, info, warn};

/// The EGL 1.4 entry points the renderer needs.
///
/// Handles are opaque and `Copy`; failures carry the `eglGetError` code.
pub trait Egl {
    type Display: Copy + Eq + std::fmt::Debug;
    type Config: Copy + std::fmt::Debug;
    type Context: Copy + Eq + std::fmt::Debug;
    type Surface: Copy + Eq + std::fmt::Debug;

    fn default_display(&self) -> Option<Self::Display>;
    fn initialize(&self, display: Self::Display) -> Result<(i32, i32), EglCode>;
    fn choose_config(
        &self,
        display: Self::Display,
        attribs: &[i32],
    ) -> Result<Option<Self::Config>, EglCode>;
    fn create_context(
        &self,
        display: Self::Display,
        config: Self::Config,
        attribs: &[i32],
    ) -> Result<Self::Context, EglCode>;
    fn create_pbuffer_surface(
        &self,
        display: Self::Display,
        config: Self::Config,
        attribs: &[i32],
    ) -> Result<Self::Surface, EglCode>;
    fn create_window_surface(
        &self,
        display: Self::Display,
        config: Self::Config,
        window: RawWindowHandle,
    ) -> Result<Self::Surface, GlError>;
    /// Binds `surface` for both draw and read; `None`s release the current binding.
    fn make_current(
        &self,
        display: Self::Display,
        surface: Option<Self::Surface>,
        context: Option<Self::Context>,
    ) -> Result<(), EglCode>;
    fn query_surface(
        &self,
        display: Self::Display,
        surface: Self::Surface,
        attribute: i32,
    ) -> Result<i32, EglCode>;
    fn swap_buffers(&self, display: Self::Display, surface: Self::Surface) -> Result<(), EglCode>;
    fn destroy_surface(
        &self,
        display: Self::Display,
        surface: Self::Surface,
    ) -> Result<(), EglCode>;
    fn destroy_context(
        &self,
        display: Self::Display,
        context: Self::Context,
    ) -> Result<(), EglCode>;
    fn terminate(&self, display: Self::Display) -> Result<(), EglCode>;
}

/// `EGL_OPENGL_ES2_BIT`.
const OPENGL_ES2_BIT: i32 = 0x0004;

fn config_attributes(config: &RendererConfig) -> [i32; 15] {
    let f = &config.format;
    [
        egl::RENDERABLE_TYPE,
        OPENGL_ES2_BIT,
        egl::RED_SIZE,
        f.red_bits,
        egl::GREEN_SIZE,
        f.green_bits,
        egl::BLUE_SIZE,
        f.blue_bits,
        egl::ALPHA_SIZE,
        f.alpha_bits,
        egl::DEPTH_SIZE,
        f.depth_bits,
        egl::STENCIL_SIZE,
        f.stencil_bits,
        egl::NONE,
    ]
}

/// Returns an initialized default display.
pub fn create_display<E: Egl>(egl: &E) -> Result<E::Display, GlError> {
    let display = egl.default_display().ok_or(GlError::NoDisplay)?;
    let (major, minor) = egl.initialize(display).map_err(GlError::Init)?;
    info!("[EGL] Display initialized (EGL {}.{})", major, minor);
    Ok(display)
}

/// Picks the frame-buffer config matching the requested surface format.
pub fn choose_config<E: Egl>(
    egl: &E,
    display: E::Display,
    config: &RendererConfig,
) -> Result<E::Config, GlError> {
    egl.choose_config(display, &config_attributes(config))
        .map_err(GlError::NoConfig)?
        .ok_or(GlError::NoConfig(egl::SUCCESS))
}

/// Creates a context for the configured GLES client version.
///
/// The display is terminated before an `UnsupportedVersion` error is returned.
pub fn create_context<E: Egl>(
    egl: &E,
    display: E::Display,
    egl_config: E::Config,
    config: &RendererConfig,
) -> Result<E::Context, GlError> {
    let attribs = [egl::CONTEXT_CLIENT_VERSION, config.gles_version, egl::NONE];
    match egl.create_context(display, egl_config, &attribs) {
        Ok(context) => Ok(context),
        Err(code) => {
            if let Err(terminate_code) = egl.terminate(display) {
                warn!("[EGL] eglTerminate after failed context creation: 0x{:x}", terminate_code);
            }
            Err(GlError::UnsupportedVersion {
                version: config.gles_version,
                code,
            })
        }
    }
}

/// Returns an off-screen surface backed by a small pixel buffer.
pub fn create_offscreen_surface<E: Egl>(
    egl: &E,
    display: E::Display,
    egl_config: E::Config,
    config: &RendererConfig,
) -> Result<E::Surface, GlError> {
    let attribs = [
        egl::WIDTH,
        config.pbuffer_width,
        egl::HEIGHT,
        config.pbuffer_height,
        egl::NONE,
    ];
    egl.create_pbuffer_surface(display, egl_config, &attribs)
        .map_err(GlError::runtime("creating pbuffer surface"))
}

/// Wraps a platform window in an EGL surface.
pub fn create_window_surface<E: Egl>(
    egl: &E,
    display: E::Display,
    egl_config: E::Config,
    window: RawWindowHandle,
) -> Result<E::Surface, GlError> {
    egl.create_window_surface(display, egl_config, window)
}

/// Makes `surface` the render target with a `width` x `height` viewport and scissor box.
pub fn focus<E: Egl, G: Gles + ?Sized>(
    egl: &E,
    gl: &G,
    display: E::Display,
    context: E::Context,
    surface: E::Surface,
    width: i32,
    height: i32,
) -> Result<(), GlError> {
    egl.make_current(display, Some(surface), Some(context))
        .map_err(GlError::runtime("making surface current"))?;
    gl.viewport(0, 0, width, height);
    gl.scissor(0, 0, width, height);
    Ok(())
}

/// Releases the current binding, destroys `context` and terminates `display`.
///
/// Each step is checked on its own. A missing display is a no-op.
pub fn destroy_context<E: Egl>(
    egl: &E,
    display: Option<E::Display>,
    context: Option<E::Context>,
) -> Result<(), GlError> {
    let Some(display) = display else {
        return Ok(());
    };

    egl.make_current(display, None, None)
        .map_err(GlError::runtime("releasing context"))?;

    if let Some(context) = context {
        egl.destroy_context(display, context)
            .map_err(GlError::runtime("destroying context"))?;
    }

    // eglReleaseThread is skipped; some drivers crash in it and the leak is one
    // thread-local block per teardown.
    egl.terminate(display)
        .map_err(GlError::runtime("terminating display"))?;
    debug!("[EGL] Context destroyed and display terminated");
    Ok(())
}

/// Tears down whatever part of a context has been built if construction bails out.
struct PartialContext<'a, E: Egl> {
    egl: &'a E,
    display: E::Display,
    context: Option<E::Context>,
    armed: bool,
}

impl<E: Egl> PartialContext<'_, E> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<E: Egl> Drop for PartialContext<'_, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(context) = self.context {
            if let Err(code) = self.egl.destroy_context(self.display, context) {
                warn!("[EGL] Cleanup eglDestroyContext failed: 0x{:x}", code);
            }
        }
        if let Err(code) = self.egl.terminate(self.display) {
            warn!("[EGL] Cleanup eglTerminate failed: 0x{:x}", code);
        }
    }
}

/// Display, context and off-screen surface, created and destroyed as one unit.
pub struct RenderingContext<E: Egl> {
    pub display: E::Display,
    pub config: E::Config,
    pub context: E::Context,
    pub surface: E::Surface,
}

impl<E: Egl> fmt::Debug for RenderingContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderingContext")
            .field("display", &self.display)
            .field("config", &self.config)
            .field("context", &self.context)
            .field("surface", &self.surface)
            .finish()
    }
}

impl<E: Egl> RenderingContext<E> {
    pub fn create(egl: &E, config: &RendererConfig) -> Result<Self, GlError> {
        let display = create_display(egl)?;
        let mut partial = PartialContext {
            egl,
            display,
            context: None,
            armed: true,
        };

        let egl_config = choose_config(egl, display, config)?;
        let context = match create_context(egl, display, egl_config, config) {
            Ok(context) => context,
            Err(e) => {
                // create_context already terminated the display.
                partial.disarm();
                return Err(e);
            }
        };
        partial.context = Some(context);

        let surface = create_offscreen_surface(egl, display, egl_config, config)?;
        partial.disarm();

        info!(
            "[EGL] Rendering context ready (GLES {}, {}x{} pbuffer)",
            config.gles_version, config.pbuffer_width, config.pbuffer_height
        );
        Ok(Self {
            display,
            config: egl_config,
            context,
            surface,
        })
    }

    /// Focuses the off-screen surface so GL calls have a target without any output bound.
    pub fn focus_offscreen<G: Gles + ?Sized>(
        &self,
        egl: &E,
        gl: &G,
        config: &RendererConfig,
    ) -> Result<(), GlError> {
        focus(
            egl,
            gl,
            self.display,
            self.context,
            self.surface,
            config.pbuffer_width,
            config.pbuffer_height,
        )
    }

    pub fn destroy(self, egl: &E) -> Result<(), GlError> {
        if let Err(code) = egl.destroy_surface(self.display, self.surface) {
            warn!("[EGL] eglDestroySurface on pbuffer failed: 0x{:x}", code);
        }
        destroy_context(egl, Some(self.display), Some(self.context))
    }
}

/// Dynamically loaded system EGL.
pub struct KhronosEgl {
    instance: egl::DynamicInstance<egl::EGL1_4>,
}

impl KhronosEgl {
    pub fn load() -> Result<Self, GlError> {
        let instance = unsafe { egl::DynamicInstance::<egl::EGL1_4>::load_required() }.map_err(
            |e| GlError::Create {
                object: "EGL instance",
                reason: e.to_string(),
            },
        )?;
        Ok(Self { instance })
    }

    /// Builds a GL function table through `eglGetProcAddress`.
    ///
    /// # Safety
    /// The returned context may only be used while a context created by this
    /// EGL instance is current on the calling thread.
    pub unsafe fn load_gl(&self) -> glow::Context {
        glow::Context::from_loader_function(|name| {
            self.instance
                .get_proc_address(name)
                .map_or(std::ptr::null(), |f| f as *const std::ffi::c_void)
        })
    }
}

fn native_window(window: RawWindowHandle) -> Result<egl::NativeWindowType, GlError> {
    let native = match window {
        RawWindowHandle::AndroidNdk(h) => h.a_native_window.as_ptr() as egl::NativeWindowType,
        RawWindowHandle::Xlib(h) => h.window as egl::NativeWindowType,
        RawWindowHandle::Xcb(h) => h.window.get() as egl::NativeWindowType,
        RawWindowHandle::Win32(h) => h.hwnd.get() as egl::NativeWindowType,
        other => return Err(GlError::Window(format!("{:?}", other))),
    };
    Ok(native)
}

impl Egl for KhronosEgl {
    type Display = egl::Display;
    type Config = egl::Config;
    type Context = egl::Context;
    type Surface = egl::Surface;

    fn default_display(&self) -> Option<egl::Display> {
        unsafe { self.instance.get_display(egl::DEFAULT_DISPLAY) }
    }

    fn initialize(&self, display: egl::Display) -> Result<(i32, i32), EglCode> {
        self.instance.initialize(display).map_err(|e| e.native())
    }

    fn choose_config(
        &self,
        display: egl::Display,
        attribs: &[i32],
    ) -> Result<Option<egl::Config>, EglCode> {
        self.instance
            .choose_first_config(display, attribs)
            .map_err(|e| e.native())
    }

    fn create_context(
        &self,
        display: egl::Display,
        config: egl::Config,
        attribs: &[i32],
    ) -> Result<egl::Context, EglCode> {
        self.instance
            .create_context(display, config, None, attribs)
            .map_err(|e| e.native())
    }

    fn create_pbuffer_surface(
        &self,
        display: egl::Display,
        config: egl::Config,
        attribs: &[i32],
    ) -> Result<egl::Surface, EglCode> {
        self.instance
            .create_pbuffer_surface(display, config, attribs)
            .map_err(|e| e.native())
    }

    fn create_window_surface(
        &self,
        display: egl::Display,
        config: egl::Config,
        window: RawWindowHandle,
    ) -> Result<egl::Surface, GlError> {
        let native = native_window(window)?;
        unsafe {
            self.instance
                .create_window_surface(display, config, native, Some(&[egl::NONE]))
        }
        .map_err(|e| GlError::Runtime {
            step: "creating window surface",
            code: e.native(),
        })
    }

    fn make_current(
        &self,
        display: egl::Display,
        surface: Option<egl::Surface>,
        context: Option<egl::Context>,
    ) -> Result<(), EglCode> {
        self.instance
            .make_current(display, surface, surface, context)
            .map_err(|e| e.native())
    }

    fn query_surface(
        &self,
        display: egl::Display,
        surface: egl::Surface,
        attribute: i32,
    ) -> Result<i32, EglCode> {
        self.instance
            .query_surface(display, surface, attribute)
            .map_err(|e| e.native())
    }

    fn swap_buffers(&self, display: egl::Display, surface: egl::Surface) -> Result<(), EglCode> {
        self.instance
            .swap_buffers(display, surface)
            .map_err(|e| e.native())
    }

    fn destroy_surface(&self, display: egl::Display, surface: egl::Surface) -> Result<(), EglCode> {
        self.instance
            .destroy_surface(display, surface)
            .map_err(|e| e.native())
    }

    fn destroy_context(&self, display: egl::Display, context: egl::Context) -> Result<(), EglCode> {
        self.instance
            .destroy_context(display, context)
            .map_err(|e| e.native())
    }

    fn terminate(&self, display: egl::Display) -> Result<(), EglCode> {
        self.instance.terminate(display).map_err(|e| e.native())
    }
}
