//! The blit program: samples the decoder's external texture onto a full-screen quad.

use crate::config::RendererConfig;
use crate::error::{GlError, ShaderKind};
use crate::gles::{check_gl_error, Gles, SAMPLER_EXTERNAL_OES, TEXTURE_EXTERNAL_OES};
use tracing::{debug, info};

pub const VERTEX_SHADER: &str = r#"
attribute vec4 a_position;
attribute vec3 a_texcoord;
varying vec2 v_texcoord;
void main() {
    gl_Position = a_position;
    v_texcoord = a_texcoord.xy;
}
"#;

pub const FRAGMENT_SHADER: &str = r#"
#extension GL_OES_EGL_image_external : require
precision mediump float;
uniform samplerExternalOES tex_sampler_0;
varying vec2 v_texcoord;
void main() {
    gl_FragColor = texture2D(tex_sampler_0, v_texcoord);
}
"#;

const POSITION_ATTRIBUTE: &str = "a_position";
const TEXCOORD_ATTRIBUTE: &str = "a_texcoord";
const SAMPLER_UNIFORM: &str = "tex_sampler_0";

/// Clip-space quad as a triangle strip, one vec4 per vertex.
pub const QUAD_POSITIONS: [f32; 16] = [
    -1.0, -1.0, 0.0, 1.0, //
    1.0, -1.0, 0.0, 1.0, //
    -1.0, 1.0, 0.0, 1.0, //
    1.0, 1.0, 0.0, 1.0,
];

/// Texture coordinates with the image turned upside down, one vec3 per vertex.
pub const QUAD_TEXCOORDS_FLIPPED: [f32; 12] = [
    0.0, 1.0, 1.0, //
    1.0, 1.0, 1.0, //
    0.0, 0.0, 1.0, //
    1.0, 0.0, 1.0,
];

pub const QUAD_TEXCOORDS: [f32; 12] = [
    0.0, 0.0, 1.0, //
    1.0, 0.0, 1.0, //
    0.0, 1.0, 1.0, //
    1.0, 1.0, 1.0,
];

const QUAD_VERTICES: i32 = 4;

/// Deletes a GL object on drop unless disarmed.
struct Guard<'a, G: Gles + ?Sized> {
    gl: &'a G,
    name: u32,
    delete: fn(&G, u32),
}

impl<'a, G: Gles + ?Sized> Guard<'a, G> {
    fn new(gl: &'a G, name: u32, delete: fn(&G, u32)) -> Self {
        Self { gl, name, delete }
    }

    fn disarm(mut self) -> u32 {
        let name = self.name;
        self.name = 0;
        name
    }
}

impl<G: Gles + ?Sized> Drop for Guard<'_, G> {
    fn drop(&mut self) {
        if self.name != 0 {
            (self.delete)(self.gl, self.name);
        }
    }
}

/// Compiles one shader stage. The shader is deleted before a compile error is returned.
pub fn compile<G: Gles + ?Sized>(gl: &G, kind: ShaderKind, source: &str) -> Result<u32, GlError> {
    let shader = gl
        .create_shader(kind.gl_enum())
        .map_err(|reason| GlError::Create {
            object: "shader",
            reason,
        })?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.shader_compile_status(shader) {
        let log = gl.shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(GlError::ShaderCompile { kind, log });
    }
    debug!("[GLES] Compiled {} shader {}", kind, shader);
    Ok(shader)
}

/// Links a program from two compiled stages.
///
/// Both shaders are released whatever the outcome; the program is deleted
/// before a link error is returned.
pub fn link<G: Gles + ?Sized>(gl: &G, vertex: u32, fragment: u32) -> Result<u32, GlError> {
    let vertex = Guard::new(gl, vertex, G::delete_shader);
    let fragment = Guard::new(gl, fragment, G::delete_shader);
    let program = gl.create_program().map_err(|reason| GlError::Create {
        object: "program",
        reason,
    })?;
    gl.attach_shader(program, vertex.name);
    gl.attach_shader(program, fragment.name);
    gl.link_program(program);
    let linked = gl.program_link_status(program);
    // Attached shaders are only flagged here and go away with the program.
    drop(vertex);
    drop(fragment);
    if !linked {
        let log = gl.program_info_log(program);
        gl.delete_program(program);
        return Err(GlError::Link { log });
    }
    debug!("[GLES] Linked program {}", program);
    Ok(program)
}

/// Lists the program's attributes in index order; the blit needs exactly two.
pub fn introspect_attributes<G: Gles + ?Sized>(
    gl: &G,
    program: u32,
) -> Result<Vec<Attribute>, GlError> {
    let count = gl.active_attribute_count(program);
    if count != 2 {
        return Err(GlError::UnexpectedShape {
            expected: 2,
            found: count,
        });
    }
    (0..count)
        .map(|index| {
            let var = gl
                .active_attribute(program, index)
                .ok_or(GlError::State("active attribute query failed"))?;
            let location = gl
                .attrib_location(program, &var.name)
                .ok_or(GlError::State("active attribute has no location"))?;
            Ok(Attribute {
                name: var.name,
                index,
                location,
                gl_type: var.gl_type,
                size: 0,
                buffer: None,
            })
        })
        .collect()
}

/// Lists the program's uniforms that have a location.
pub fn introspect_uniforms<G: Gles + ?Sized>(
    gl: &G,
    program: u32,
) -> Result<Vec<Uniform>, GlError> {
    let mut uniforms = Vec::new();
    for index in 0..gl.active_uniform_count(program) {
        let var = gl
            .active_uniform(program, index)
            .ok_or(GlError::State("active uniform query failed"))?;
        let Some(location) = gl.uniform_location(program, &var.name) else {
            continue;
        };
        uniforms.push(Uniform {
            name: var.name,
            location,
            gl_type: var.gl_type,
            texture: 0,
            unit: 0,
        });
    }
    Ok(uniforms)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub index: u32,
    pub location: u32,
    pub gl_type: u32,
    size: i32,
    buffer: Option<u32>,
}

impl Attribute {
    /// Components per vertex of the attached data; 0 before [`set_buffer`](Self::set_buffer).
    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn buffer(&self) -> Option<u32> {
        self.buffer
    }

    /// Copies `data` into this attribute's vertex buffer, `size` floats per vertex.
    pub fn set_buffer<G: Gles + ?Sized>(
        &mut self,
        gl: &G,
        data: &[f32],
        size: i32,
    ) -> Result<(), GlError> {
        if !(1..=4).contains(&size) || data.len() % size as usize != 0 {
            return Err(GlError::State("vertex data must hold whole vertices of 1-4 floats"));
        }
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => gl.create_buffer().map_err(|reason| GlError::Create {
                object: "vertex buffer",
                reason,
            })?,
        };
        self.buffer = Some(buffer);
        self.size = size;
        gl.bind_array_buffer(buffer);
        gl.array_buffer_data(data);
        gl.bind_array_buffer(0);
        check_gl_error(gl)
    }

    pub fn bind<G: Gles + ?Sized>(&self, gl: &G) -> Result<(), GlError> {
        let buffer = self
            .buffer
            .ok_or(GlError::State("call set_buffer before bind"))?;
        gl.bind_array_buffer(buffer);
        gl.vertex_attrib_pointer(self.location, self.size);
        gl.enable_vertex_attrib_array(self.location);
        gl.bind_array_buffer(0);
        check_gl_error(gl)
    }

    pub fn delete<G: Gles + ?Sized>(&mut self, gl: &G) {
        if let Some(buffer) = self.buffer.take() {
            gl.delete_buffer(buffer);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    Texture2d,
    External,
    Other(u32),
}

impl SamplerKind {
    pub fn from_gl_type(gl_type: u32) -> Self {
        match gl_type {
            glow::SAMPLER_2D => SamplerKind::Texture2d,
            SAMPLER_EXTERNAL_OES => SamplerKind::External,
            other => SamplerKind::Other(other),
        }
    }

    fn texture_target(self) -> Result<u32, GlError> {
        match self {
            SamplerKind::Texture2d => Ok(glow::TEXTURE_2D),
            SamplerKind::External => Ok(TEXTURE_EXTERNAL_OES),
            SamplerKind::Other(code) => Err(GlError::UnsupportedType(code)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uniform {
    pub name: String,
    pub location: u32,
    pub gl_type: u32,
    texture: u32,
    unit: u32,
}

impl Uniform {
    pub fn kind(&self) -> SamplerKind {
        SamplerKind::from_gl_type(self.gl_type)
    }

    pub fn is_sampler(&self) -> bool {
        !matches!(self.kind(), SamplerKind::Other(_))
    }

    pub fn set_texture(&mut self, texture: u32, unit: u32) {
        self.texture = texture;
        self.unit = unit;
    }

    /// Binds the attached texture on its unit with linear filtering and
    /// edge clamping, then points the sampler at that unit.
    pub fn bind<G: Gles + ?Sized>(&self, gl: &G) -> Result<(), GlError> {
        if self.texture == 0 {
            return Err(GlError::State("call set_texture before bind"));
        }
        let target = self.kind().texture_target()?;
        gl.active_texture(self.unit);
        gl.bind_texture(target, self.texture);
        gl.tex_parameter(target, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
        gl.tex_parameter(target, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
        gl.tex_parameter(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        gl.uniform_1i(self.location, self.unit as i32);
        check_gl_error(gl)
    }
}

/// Compiled blit program with its quad buffers; built once and drawn every frame.
#[derive(Debug)]
pub struct BlitProgram {
    program: u32,
    position: Attribute,
    texcoord: Attribute,
    uniforms: Vec<Uniform>,
    sampler: usize,
    unit: u32,
}

impl BlitProgram {
    pub fn new<G: Gles + ?Sized>(gl: &G, config: &RendererConfig) -> Result<Self, GlError> {
        let vertex = Guard::new(
            gl,
            compile(gl, ShaderKind::Vertex, VERTEX_SHADER)?,
            G::delete_shader,
        );
        let fragment = compile(gl, ShaderKind::Fragment, FRAGMENT_SHADER)?;
        let program = Guard::new(gl, link(gl, vertex.disarm(), fragment)?, G::delete_program);

        let mut attributes = introspect_attributes(gl, program.name)?;
        let position = take_attribute(&mut attributes, POSITION_ATTRIBUTE)?;
        let texcoord = take_attribute(&mut attributes, TEXCOORD_ATTRIBUTE)?;

        let uniforms = introspect_uniforms(gl, program.name)?;
        let sampler = uniforms
            .iter()
            .position(|u| u.name == SAMPLER_UNIFORM)
            .or_else(|| uniforms.iter().position(|u| u.is_sampler()))
            .ok_or(GlError::State("blit program has no sampler uniform"))?;

        let mut blit = BlitProgram {
            program: program.disarm(),
            position,
            texcoord,
            uniforms,
            sampler,
            unit: config.sampler_unit,
        };
        let texcoords: &[f32] = if config.flip_vertical {
            &QUAD_TEXCOORDS_FLIPPED
        } else {
            &QUAD_TEXCOORDS
        };
        let uploaded = blit
            .position
            .set_buffer(gl, &QUAD_POSITIONS, 4)
            .and_then(|()| blit.texcoord.set_buffer(gl, texcoords, 3));
        if let Err(e) = uploaded {
            blit.delete(gl);
            return Err(e);
        }

        info!(
            "[GLES] Blit program {} ready (sampler {} on unit {})",
            blit.program,
            blit.sampler().name,
            blit.unit
        );
        Ok(blit)
    }

    pub fn program(&self) -> u32 {
        self.program
    }

    pub fn position(&self) -> &Attribute {
        &self.position
    }

    pub fn texcoord(&self) -> &Attribute {
        &self.texcoord
    }

    pub fn sampler(&self) -> &Uniform {
        &self.uniforms[self.sampler]
    }

    /// Every located uniform of the linked program, the sampler included.
    pub fn uniforms(&self) -> &[Uniform] {
        &self.uniforms
    }

    /// Draws `texture` over the whole current render target.
    ///
    /// Every uniform is bound to `texture`; a program with a non-sampler
    /// uniform fails here with [`GlError::UnsupportedType`].
    pub fn draw<G: Gles + ?Sized>(&mut self, gl: &G, texture: u32) -> Result<(), GlError> {
        gl.use_program(self.program);
        check_gl_error(gl)?;
        for uniform in &mut self.uniforms {
            uniform.set_texture(texture, self.unit);
        }
        self.position.bind(gl)?;
        self.texcoord.bind(gl)?;
        for uniform in &self.uniforms {
            uniform.bind(gl)?;
        }
        gl.draw_arrays(glow::TRIANGLE_STRIP, 0, QUAD_VERTICES);
        check_gl_error(gl)
    }

    pub fn delete<G: Gles + ?Sized>(&mut self, gl: &G) {
        self.position.delete(gl);
        self.texcoord.delete(gl);
        if self.program != 0 {
            gl.delete_program(self.program);
            self.program = 0;
        }
    }
}

fn take_attribute(
    attributes: &mut Vec<Attribute>,
    name: &'static str,
) -> Result<Attribute, GlError> {
    let index = attributes
        .iter()
        .position(|a| a.name == name)
        .ok_or(GlError::State("blit program is missing a vertex attribute"))?;
    Ok(attributes.swap_remove(index))
}
