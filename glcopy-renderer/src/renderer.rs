//! The video renderer the host player drives: decoder output lands on an
//! off-screen external texture and is copied to whatever display surface is
//! currently assigned.

use crate::config::RendererConfig;
use crate::copier::{FrameCopier, OutputStep, RenderState};
use crate::egl::{self as gpu, Egl, KhronosEgl, RenderingContext};
use crate::error::{GlError, PlaybackError};
use crate::frame_signal::FrameNotifier;
use crate::gles::Gles;
use crate::output::{OutputBinder, OutputSurface, SurfaceGate};
use crate::program::BlitProgram;
use tracing::{debug, error, info, trace, warn};

/// Hooks the host player calls on its playback thread.
pub trait VideoRenderer {
    type Surface;

    /// The host assigned a new display surface, or cleared it with `None`.
    fn handle_surface_message(
        &mut self,
        surface: Option<Self::Surface>,
    ) -> Result<(), PlaybackError>;

    /// Per-tick work; copies a waiting frame to the display.
    fn do_work(&mut self, position_us: i64, elapsed_realtime_us: i64) -> Result<(), PlaybackError>;

    /// Asked to emit the current decoded sample. `render` asks the decoder to
    /// render its current output buffer onto the texture and reports whether
    /// it accepted. Returns whether the buffer was consumed.
    fn process_output_buffer(
        &mut self,
        render: &mut dyn FnMut() -> bool,
    ) -> Result<bool, PlaybackError>;

    fn flush(&mut self);

    fn release(&mut self) -> Result<(), PlaybackError>;
}

/// The decoder's view of the texture frames are rendered onto.
pub trait ExternalTexture {
    /// Latches the most recently rendered frame into the texture.
    ///
    /// Called on the render thread with the context current.
    fn update_tex_image(&mut self) -> Result<(), PlaybackError>;
}

/// Host-side decoder plumbing.
pub trait DecoderSurfaceProvider {
    type Target: ExternalTexture;

    /// Wraps `texture` in a surface the decoder can render into. `notifier`
    /// is raised from the decoder's thread whenever a frame lands.
    fn attach_texture(
        &mut self,
        texture: u32,
        notifier: FrameNotifier,
    ) -> Result<Self::Target, PlaybackError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    pub frames_imported: u64,
    pub frames_copied: u64,
    /// Ticks where the output surface was missing, invalid or empty.
    pub ticks_skipped: u64,
}

/// Everything created on the first surface assignment.
struct GpuState<E: Egl, T, S: OutputSurface> {
    context: RenderingContext<E>,
    program: BlitProgram,
    texture: u32,
    external: T,
    output: OutputBinder<E, S>,
}

/// Builds the GL function table once a context is current.
pub type GlLoader<E, G> = fn(&E) -> G;

pub struct GlVideoRenderer<E, G, D, S>
where
    E: Egl,
    G: Gles,
    D: DecoderSurfaceProvider,
    S: OutputSurface,
{
    egl: E,
    gl: Option<G>,
    load_gl: GlLoader<E, G>,
    decoder: D,
    config: RendererConfig,
    gpu: Option<GpuState<E, D::Target, S>>,
    copier: FrameCopier,
    gate: SurfaceGate,
    stats: CopyStats,
    setup_failed: bool,
    released: bool,
}

impl<D, S> GlVideoRenderer<KhronosEgl, glow::Context, D, S>
where
    D: DecoderSurfaceProvider,
    S: OutputSurface,
{
    /// A renderer on the system EGL library.
    pub fn with_system_egl(decoder: D, config: RendererConfig) -> Result<Self, GlError> {
        let egl = KhronosEgl::load()?;
        // The loader only runs from setup, right after the pbuffer is made
        // current on the render thread.
        Ok(Self::new(egl, decoder, config, |egl| unsafe { egl.load_gl() }))
    }
}

impl<E, G, D, S> GlVideoRenderer<E, G, D, S>
where
    E: Egl,
    G: Gles,
    D: DecoderSurfaceProvider,
    S: OutputSurface,
{
    pub fn new(egl: E, decoder: D, config: RendererConfig, load_gl: GlLoader<E, G>) -> Self {
        Self {
            egl,
            gl: None,
            load_gl,
            decoder,
            config,
            gpu: None,
            copier: FrameCopier::new(),
            gate: SurfaceGate::new(),
            stats: CopyStats::default(),
            setup_failed: false,
            released: false,
        }
    }

    pub fn egl(&self) -> &E {
        &self.egl
    }

    pub fn gl(&self) -> Option<&G> {
        self.gl.as_ref()
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn state(&self) -> RenderState {
        self.copier.state()
    }

    pub fn stats(&self) -> CopyStats {
        self.stats
    }

    /// Gate the UI side must hold while it destroys the platform surface.
    pub fn surface_gate(&self) -> SurfaceGate {
        self.gate.clone()
    }

    /// Size of the output binding as of the last tick.
    pub fn output_size(&self) -> Option<(i32, i32)> {
        let bound = self.gpu.as_ref()?.output.bound()?;
        Some((bound.width, bound.height))
    }

    fn setup(&mut self) -> Result<GpuState<E, D::Target, S>, PlaybackError> {
        let context =
            RenderingContext::create(&self.egl, &self.config).map_err(PlaybackError::Setup)?;
        if let Err(code) = self.egl.make_current(
            context.display,
            Some(context.surface),
            Some(context.context),
        ) {
            discard_context(&self.egl, context);
            return Err(PlaybackError::Setup(GlError::Runtime {
                step: "making pbuffer current",
                code,
            }));
        }

        let gl: &G = self.gl.get_or_insert_with(|| (self.load_gl)(&self.egl));
        let built = context
            .focus_offscreen(&self.egl, gl, &self.config)
            .and_then(|()| BlitProgram::new(gl, &self.config));
        let mut program = match built {
            Ok(program) => program,
            Err(e) => {
                discard_context(&self.egl, context);
                return Err(PlaybackError::Setup(e));
            }
        };

        let texture = match gl.create_texture() {
            Ok(texture) => texture,
            Err(reason) => {
                program.delete(gl);
                discard_context(&self.egl, context);
                return Err(PlaybackError::Setup(GlError::Create {
                    object: "decoder texture",
                    reason,
                }));
            }
        };

        match self.decoder.attach_texture(texture, self.copier.notifier()) {
            Ok(external) => {
                info!("[RENDER] Decoder texture {} attached", texture);
                Ok(GpuState {
                    context,
                    program,
                    texture,
                    external,
                    output: OutputBinder::new(),
                })
            }
            Err(e) => {
                gl.delete_texture(texture);
                program.delete(gl);
                discard_context(&self.egl, context);
                Err(e)
            }
        }
    }
}

fn discard_context<E: Egl>(egl: &E, context: RenderingContext<E>) {
    if let Err(e) = context.destroy(egl) {
        warn!("[EGL] Tearing down partial setup failed: {}", e);
    }
}

impl<E, G, D, S> VideoRenderer for GlVideoRenderer<E, G, D, S>
where
    E: Egl,
    G: Gles,
    D: DecoderSurfaceProvider,
    S: OutputSurface,
{
    type Surface = S;

    fn handle_surface_message(&mut self, surface: Option<S>) -> Result<(), PlaybackError> {
        if self.setup_failed {
            return Err(PlaybackError::RenderingUnavailable);
        }
        if self.released {
            debug!("[RENDER] Surface message after release ignored");
            return Ok(());
        }
        if self.gpu.is_none() {
            if surface.is_none() {
                return Ok(());
            }
            match self.setup() {
                Ok(state) => self.gpu = Some(state),
                Err(e) => {
                    error!("[RENDER] GL setup failed: {}", e);
                    self.setup_failed = true;
                    return Err(e);
                }
            }
        }

        let (Some(state), Some(gl)) = (self.gpu.as_mut(), self.gl.as_ref()) else {
            return Ok(());
        };
        if state.output.targets(&surface) {
            return Ok(());
        }
        // The old window surface may be current; park the context on the pbuffer first.
        if state.output.bound().is_some() {
            if let Err(e) = state.context.focus_offscreen(&self.egl, gl, &self.config) {
                warn!("[RENDER] Could not focus pbuffer before surface change: {}", e);
            }
        }
        state
            .output
            .set_output_surface(&self.egl, state.context.display, surface);
        Ok(())
    }

    fn do_work(&mut self, position_us: i64, elapsed_realtime_us: i64) -> Result<(), PlaybackError> {
        let (Some(state), Some(gl)) = (self.gpu.as_mut(), self.gl.as_ref()) else {
            return Ok(());
        };
        let _held = self.gate.hold();

        let display = state.context.display;
        let Some(bound) = state
            .output
            .prepare(&self.egl, display, state.context.config)
        else {
            self.stats.ticks_skipped += 1;
            trace!("[RENDER] Output not ready, tick skipped");
            return Ok(());
        };
        if !self.copier.blit_due() {
            return Ok(());
        }

        gpu::focus(
            &self.egl,
            gl,
            display,
            state.context.context,
            bound.surface,
            bound.width,
            bound.height,
        )
        .map_err(PlaybackError::Render)?;
        state
            .program
            .draw(gl, state.texture)
            .map_err(PlaybackError::Render)?;

        if let Err(code) = self.egl.swap_buffers(display, bound.surface) {
            // Usually the window went away under us; keep the frame and rebind next tick.
            warn!("[COPY] eglSwapBuffers failed: 0x{:x}", code);
            if let Err(e) = state.context.focus_offscreen(&self.egl, gl, &self.config) {
                warn!("[COPY] Could not focus pbuffer after failed swap: {}", e);
            }
            state.output.invalidate(&self.egl, display);
            return Ok(());
        }

        self.copier.blit_done();
        self.stats.frames_copied += 1;
        trace!(
            "[COPY] Frame copied at {}us ({}us elapsed) to {}x{}",
            position_us,
            elapsed_realtime_us,
            bound.width,
            bound.height
        );
        Ok(())
    }

    fn process_output_buffer(
        &mut self,
        render: &mut dyn FnMut() -> bool,
    ) -> Result<bool, PlaybackError> {
        let Some(state) = self.gpu.as_mut() else {
            return Ok(false);
        };
        match self.copier.next_output_step() {
            OutputStep::ImportFrame => {
                state.external.update_tex_image()?;
                self.copier.frame_imported();
                self.stats.frames_imported += 1;
                Ok(false)
            }
            OutputStep::RequestRender => {
                if !render() {
                    return Ok(false);
                }
                self.copier.render_requested();
                Ok(true)
            }
            OutputStep::Hold => Ok(false),
        }
    }

    fn flush(&mut self) {
        debug!("[COPY] Flushed in state {}", self.copier.state());
        self.copier.reset();
    }

    fn release(&mut self) -> Result<(), PlaybackError> {
        self.copier.reset();
        self.released = true;
        let Some(mut state) = self.gpu.take() else {
            return Ok(());
        };
        let display = state.context.display;

        if let Some(gl) = self.gl.as_ref() {
            match state.context.focus_offscreen(&self.egl, gl, &self.config) {
                Ok(()) => {
                    state.program.delete(gl);
                    gl.delete_texture(state.texture);
                }
                Err(e) => warn!("[RENDER] Could not focus pbuffer for teardown: {}", e),
            }
        }
        drop(state.external);
        state.output.release(&self.egl, display);
        let result = state
            .context
            .destroy(&self.egl)
            .map_err(PlaybackError::Render);

        let stats = self.stats;
        info!(
            "[RENDER] Released: {} frames imported, {} copied, {} ticks skipped",
            stats.frames_imported, stats.frames_copied, stats.ticks_skipped
        );
        result
    }
}
