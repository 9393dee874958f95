//! The slice of GLES2 the copy pipeline uses.
//!
//! Object names are plain `u32` GL names (0 is "none"). Every call targets the
//! context that is current on the calling thread; implementations assume the
//! render thread has focused a surface first (see [`crate::egl`]).

use crate::error::GlError;
use glow::HasContext;
use std::num::NonZeroU32;
use tracing::trace;

/// `GL_TEXTURE_EXTERNAL_OES` from `OES_EGL_image_external`.
pub const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;
/// `GL_SAMPLER_EXTERNAL_OES` from `OES_EGL_image_external`.
pub const SAMPLER_EXTERNAL_OES: u32 = 0x8D66;

/// An active attribute or uniform as reported by program introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    pub name: String,
    pub size: i32,
    pub gl_type: u32,
}

pub trait Gles {
    fn create_shader(&self, kind: u32) -> Result<u32, String>;
    fn shader_source(&self, shader: u32, source: &str);
    fn compile_shader(&self, shader: u32);
    fn shader_compile_status(&self, shader: u32) -> bool;
    fn shader_info_log(&self, shader: u32) -> String;
    fn delete_shader(&self, shader: u32);

    fn create_program(&self) -> Result<u32, String>;
    fn attach_shader(&self, program: u32, shader: u32);
    fn link_program(&self, program: u32);
    fn program_link_status(&self, program: u32) -> bool;
    fn program_info_log(&self, program: u32) -> String;
    fn delete_program(&self, program: u32);
    fn use_program(&self, program: u32);

    fn active_attribute_count(&self, program: u32) -> u32;
    fn active_attribute(&self, program: u32, index: u32) -> Option<ActiveVariable>;
    fn attrib_location(&self, program: u32, name: &str) -> Option<u32>;
    fn active_uniform_count(&self, program: u32) -> u32;
    fn active_uniform(&self, program: u32, index: u32) -> Option<ActiveVariable>;
    fn uniform_location(&self, program: u32, name: &str) -> Option<u32>;
    fn uniform_1i(&self, location: u32, value: i32);

    fn create_texture(&self) -> Result<u32, String>;
    fn delete_texture(&self, texture: u32);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: u32);
    fn tex_parameter(&self, target: u32, pname: u32, value: i32);

    fn create_buffer(&self) -> Result<u32, String>;
    fn delete_buffer(&self, buffer: u32);
    /// Binds `buffer` to `GL_ARRAY_BUFFER`; 0 unbinds.
    fn bind_array_buffer(&self, buffer: u32);
    /// Uploads `data` into the bound array buffer (`GL_STATIC_DRAW`).
    fn array_buffer_data(&self, data: &[f32]);
    /// Float attribute pointer into the bound array buffer, tightly packed from offset 0.
    fn vertex_attrib_pointer(&self, location: u32, size: i32);
    fn enable_vertex_attrib_array(&self, index: u32);

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32);
    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    fn get_error(&self) -> u32;
}

/// Reads the GL error flag and fails on anything but `GL_NO_ERROR`.
pub fn check_gl_error<G: Gles + ?Sized>(gl: &G) -> Result<(), GlError> {
    match gl.get_error() {
        glow::NO_ERROR => Ok(()),
        code => Err(GlError::Gl(code)),
    }
}

fn name(id: u32) -> Option<NonZeroU32> {
    NonZeroU32::new(id)
}

impl Gles for glow::Context {
    fn create_shader(&self, kind: u32) -> Result<u32, String> {
        unsafe { HasContext::create_shader(self, kind).map(|s| s.0.get()) }
    }

    fn shader_source(&self, shader: u32, source: &str) {
        if let Some(s) = name(shader) {
            unsafe { HasContext::shader_source(self, glow::NativeShader(s), source) }
        }
    }

    fn compile_shader(&self, shader: u32) {
        if let Some(s) = name(shader) {
            unsafe { HasContext::compile_shader(self, glow::NativeShader(s)) }
        }
    }

    fn shader_compile_status(&self, shader: u32) -> bool {
        name(shader)
            .map(|s| unsafe { HasContext::get_shader_compile_status(self, glow::NativeShader(s)) })
            .unwrap_or(false)
    }

    fn shader_info_log(&self, shader: u32) -> String {
        name(shader)
            .map(|s| unsafe { HasContext::get_shader_info_log(self, glow::NativeShader(s)) })
            .unwrap_or_default()
    }

    fn delete_shader(&self, shader: u32) {
        if let Some(s) = name(shader) {
            unsafe { HasContext::delete_shader(self, glow::NativeShader(s)) }
        }
    }

    fn create_program(&self) -> Result<u32, String> {
        unsafe { HasContext::create_program(self).map(|p| p.0.get()) }
    }

    fn attach_shader(&self, program: u32, shader: u32) {
        if let (Some(p), Some(s)) = (name(program), name(shader)) {
            unsafe {
                HasContext::attach_shader(self, glow::NativeProgram(p), glow::NativeShader(s))
            }
        }
    }

    fn link_program(&self, program: u32) {
        if let Some(p) = name(program) {
            unsafe { HasContext::link_program(self, glow::NativeProgram(p)) }
        }
    }

    fn program_link_status(&self, program: u32) -> bool {
        name(program)
            .map(|p| unsafe { HasContext::get_program_link_status(self, glow::NativeProgram(p)) })
            .unwrap_or(false)
    }

    fn program_info_log(&self, program: u32) -> String {
        name(program)
            .map(|p| unsafe { HasContext::get_program_info_log(self, glow::NativeProgram(p)) })
            .unwrap_or_default()
    }

    fn delete_program(&self, program: u32) {
        if let Some(p) = name(program) {
            unsafe { HasContext::delete_program(self, glow::NativeProgram(p)) }
        }
    }

    fn use_program(&self, program: u32) {
        unsafe { HasContext::use_program(self, name(program).map(glow::NativeProgram)) }
    }

    fn active_attribute_count(&self, program: u32) -> u32 {
        name(program)
            .map(|p| unsafe { HasContext::get_active_attributes(self, glow::NativeProgram(p)) })
            .unwrap_or(0)
    }

    fn active_attribute(&self, program: u32, index: u32) -> Option<ActiveVariable> {
        let p = glow::NativeProgram(name(program)?);
        let attr = unsafe { HasContext::get_active_attribute(self, p, index) }?;
        Some(ActiveVariable {
            name: attr.name,
            size: attr.size,
            gl_type: attr.atype,
        })
    }

    fn attrib_location(&self, program: u32, attr: &str) -> Option<u32> {
        let p = glow::NativeProgram(name(program)?);
        unsafe { HasContext::get_attrib_location(self, p, attr) }
    }

    fn active_uniform_count(&self, program: u32) -> u32 {
        name(program)
            .map(|p| unsafe { HasContext::get_active_uniforms(self, glow::NativeProgram(p)) })
            .unwrap_or(0)
    }

    fn active_uniform(&self, program: u32, index: u32) -> Option<ActiveVariable> {
        let p = glow::NativeProgram(name(program)?);
        let uniform = unsafe { HasContext::get_active_uniform(self, p, index) }?;
        Some(ActiveVariable {
            name: uniform.name,
            size: uniform.size,
            gl_type: uniform.utype,
        })
    }

    fn uniform_location(&self, program: u32, uniform: &str) -> Option<u32> {
        let p = glow::NativeProgram(name(program)?);
        unsafe { HasContext::get_uniform_location(self, p, uniform) }.map(|l| l.0)
    }

    fn uniform_1i(&self, location: u32, value: i32) {
        let location = glow::NativeUniformLocation(location);
        unsafe { HasContext::uniform_1_i32(self, Some(&location), value) }
    }

    fn create_texture(&self) -> Result<u32, String> {
        unsafe { HasContext::create_texture(self).map(|t| t.0.get()) }
    }

    fn delete_texture(&self, texture: u32) {
        if let Some(t) = name(texture) {
            unsafe { HasContext::delete_texture(self, glow::NativeTexture(t)) }
        }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { HasContext::active_texture(self, glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: u32, texture: u32) {
        unsafe { HasContext::bind_texture(self, target, name(texture).map(glow::NativeTexture)) }
    }

    fn tex_parameter(&self, target: u32, pname: u32, value: i32) {
        unsafe { HasContext::tex_parameter_i32(self, target, pname, value) }
    }

    fn create_buffer(&self) -> Result<u32, String> {
        unsafe { HasContext::create_buffer(self).map(|b| b.0.get()) }
    }

    fn delete_buffer(&self, buffer: u32) {
        if let Some(b) = name(buffer) {
            unsafe { HasContext::delete_buffer(self, glow::NativeBuffer(b)) }
        }
    }

    fn bind_array_buffer(&self, buffer: u32) {
        unsafe {
            HasContext::bind_buffer(self, glow::ARRAY_BUFFER, name(buffer).map(glow::NativeBuffer))
        }
    }

    fn array_buffer_data(&self, data: &[f32]) {
        trace!("[GLES] Uploading {} floats to array buffer", data.len());
        unsafe {
            HasContext::buffer_data_u8_slice(
                self,
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(data),
                glow::STATIC_DRAW,
            )
        }
    }

    fn vertex_attrib_pointer(&self, location: u32, size: i32) {
        unsafe {
            HasContext::vertex_attrib_pointer_f32(self, location, size, glow::FLOAT, false, 0, 0)
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { HasContext::enable_vertex_attrib_array(self, index) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { HasContext::viewport(self, x, y, width, height) }
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { HasContext::scissor(self, x, y, width, height) }
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { HasContext::draw_arrays(self, mode, first, count) }
    }

    fn get_error(&self) -> u32 {
        unsafe { HasContext::get_error(self) }
    }
}
