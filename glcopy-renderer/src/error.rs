use std::fmt;

/// Raw EGL error code as returned by `eglGetError`.
pub type EglCode = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

impl ShaderKind {
    pub fn gl_enum(self) -> u32 {
        match self {
            ShaderKind::Vertex => glow::VERTEX_SHADER,
            ShaderKind::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderKind::Vertex => f.write_str("vertex"),
            ShaderKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Failures of the EGL/GLES layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GlError {
    #[error("no EGL display")]
    NoDisplay,
    #[error("error in eglInitialize: 0x{0:x}")]
    Init(EglCode),
    #[error("EGL config selection failed: 0x{0:x}")]
    NoConfig(EglCode),
    #[error("GLES {version} context unsupported: 0x{code:x}")]
    UnsupportedVersion { version: i32, code: EglCode },
    #[error("error {step}: 0x{code:x}")]
    Runtime { step: &'static str, code: EglCode },
    #[error("could not create {object}: {reason}")]
    Create { object: &'static str, reason: String },
    #[error("could not compile {kind} shader: {log}")]
    ShaderCompile { kind: ShaderKind, log: String },
    #[error("could not link shader program: {log}")]
    Link { log: String },
    #[error("expected {expected} attributes, program has {found}")]
    UnexpectedShape { expected: u32, found: u32 },
    #[error("{0}")]
    State(&'static str),
    #[error("unexpected uniform type: 0x{0:x}")]
    UnsupportedType(u32),
    #[error("gl error: 0x{0:x}")]
    Gl(u32),
    #[error("window handle cannot back an EGL surface: {0}")]
    Window(String),
}

impl GlError {
    pub(crate) fn runtime(step: &'static str) -> impl FnOnce(EglCode) -> GlError {
        move |code| GlError::Runtime { step, code }
    }
}

/// Error surfaced to the host player through its standard error channel.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("setting up GL rendering failed: {0}")]
    Setup(#[source] GlError),
    #[error("GL rendering failed: {0}")]
    Render(#[source] GlError),
    #[error("GL rendering is unavailable after an earlier setup failure")]
    RenderingUnavailable,
    #[error("decoder output surface failed: {0}")]
    Decoder(String),
}
