//! Recording stand-ins for EGL and GLES used by the unit tests.

use crate::egl::Egl;
use crate::error::{EglCode, GlError, PlaybackError};
use crate::frame_signal::FrameNotifier;
use crate::gles::{ActiveVariable, Gles, SAMPLER_EXTERNAL_OES};
use crate::renderer::{DecoderSurfaceProvider, ExternalTexture};
use khronos_egl as egl;
use raw_window_handle::{
    AndroidNdkWindowHandle, HandleError, HasWindowHandle, RawWindowHandle, WindowHandle,
};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::c_void;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const GL_FLOAT_VEC3: u32 = 0x8B51;
const GL_FLOAT_VEC4: u32 = 0x8B52;

#[derive(Debug, Clone, PartialEq)]
pub enum EglCall {
    Initialize(u32),
    CreateContext(u32),
    CreatePbuffer(u32),
    CreateWindow { display: u32, window: usize },
    MakeCurrent(Option<u32>, Option<u32>),
    Query(u32, i32),
    Swap(u32),
    DestroySurface(u32),
    DestroyContext(u32),
    Terminate(u32),
}

#[derive(Default)]
struct EglFailures {
    initialize: Option<EglCode>,
    create_context: Option<EglCode>,
    create_pbuffer: Option<EglCode>,
    create_window: Option<EglCode>,
    release_current: Option<EglCode>,
    destroy_context: Option<EglCode>,
    swap: Option<EglCode>,
}

pub struct FakeEgl {
    has_display: Cell<bool>,
    next_id: Cell<u32>,
    failures: RefCell<EglFailures>,
    calls: RefCell<Vec<EglCall>>,
    config_attribs: RefCell<Vec<i32>>,
    surfaces: RefCell<HashMap<u32, (i32, i32)>>,
    window_surfaces: RefCell<HashMap<u32, usize>>,
    windows: RefCell<HashMap<usize, (i32, i32)>>,
    contexts: RefCell<HashSet<u32>>,
    terminated: RefCell<HashSet<u32>>,
    current: Cell<Option<(u32, u32)>>,
}

impl FakeEgl {
    pub fn new() -> Self {
        Self {
            has_display: Cell::new(true),
            next_id: Cell::new(1),
            failures: RefCell::new(EglFailures::default()),
            calls: RefCell::new(Vec::new()),
            config_attribs: RefCell::new(Vec::new()),
            surfaces: RefCell::new(HashMap::new()),
            window_surfaces: RefCell::new(HashMap::new()),
            windows: RefCell::new(HashMap::new()),
            contexts: RefCell::new(HashSet::new()),
            terminated: RefCell::new(HashSet::new()),
            current: Cell::new(None),
        }
    }

    fn id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn log(&self, call: EglCall) {
        self.calls.borrow_mut().push(call);
    }

    pub fn set_has_display(&self, has: bool) {
        self.has_display.set(has);
    }
    pub fn fail_initialize(&self, code: EglCode) {
        self.failures.borrow_mut().initialize = Some(code);
    }
    pub fn fail_create_context(&self, code: EglCode) {
        self.failures.borrow_mut().create_context = Some(code);
    }
    pub fn fail_create_pbuffer(&self, code: EglCode) {
        self.failures.borrow_mut().create_pbuffer = Some(code);
    }
    pub fn fail_create_window(&self, code: Option<EglCode>) {
        self.failures.borrow_mut().create_window = code;
    }
    pub fn fail_release_current(&self, code: EglCode) {
        self.failures.borrow_mut().release_current = Some(code);
    }
    pub fn fail_destroy_context(&self, code: EglCode) {
        self.failures.borrow_mut().destroy_context = Some(code);
    }
    pub fn fail_swap(&self, code: Option<EglCode>) {
        self.failures.borrow_mut().swap = code;
    }

    /// Declares the size the platform reports for the native window at `window`.
    pub fn set_window_size(&self, window: usize, width: i32, height: i32) {
        self.windows.borrow_mut().insert(window, (width, height));
    }

    pub fn calls(&self) -> Vec<EglCall> {
        self.calls.borrow().clone()
    }
    pub fn last_config_attribs(&self) -> Vec<i32> {
        self.config_attribs.borrow().clone()
    }
    pub fn current(&self) -> Option<(u32, u32)> {
        self.current.get()
    }
    pub fn surface_size(&self, surface: u32) -> Option<(i32, i32)> {
        self.surfaces.borrow().get(&surface).copied()
    }
    pub fn window_of(&self, surface: u32) -> Option<usize> {
        self.window_surfaces.borrow().get(&surface).copied()
    }
    pub fn live_surfaces(&self) -> usize {
        self.surfaces.borrow().len()
    }
    pub fn live_window_surfaces(&self) -> usize {
        self.window_surfaces.borrow().len()
    }
    pub fn live_contexts(&self) -> usize {
        self.contexts.borrow().len()
    }
    pub fn is_terminated(&self, display: u32) -> bool {
        self.terminated.borrow().contains(&display)
    }
    pub fn count(&self, pred: impl Fn(&EglCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }
}

impl Egl for FakeEgl {
    type Display = u32;
    type Config = u32;
    type Context = u32;
    type Surface = u32;

    fn default_display(&self) -> Option<u32> {
        self.has_display.get().then(|| self.id())
    }

    fn initialize(&self, display: u32) -> Result<(i32, i32), EglCode> {
        self.log(EglCall::Initialize(display));
        match self.failures.borrow().initialize {
            Some(code) => Err(code),
            None => Ok((1, 4)),
        }
    }

    fn choose_config(&self, _display: u32, attribs: &[i32]) -> Result<Option<u32>, EglCode> {
        *self.config_attribs.borrow_mut() = attribs.to_vec();
        Ok(Some(self.id()))
    }

    fn create_context(&self, display: u32, _config: u32, _attribs: &[i32]) -> Result<u32, EglCode> {
        self.log(EglCall::CreateContext(display));
        if let Some(code) = self.failures.borrow().create_context {
            return Err(code);
        }
        let id = self.id();
        self.contexts.borrow_mut().insert(id);
        Ok(id)
    }

    fn create_pbuffer_surface(
        &self,
        display: u32,
        _config: u32,
        attribs: &[i32],
    ) -> Result<u32, EglCode> {
        self.log(EglCall::CreatePbuffer(display));
        if let Some(code) = self.failures.borrow().create_pbuffer {
            return Err(code);
        }
        let mut width = 0;
        let mut height = 0;
        for pair in attribs.chunks(2) {
            match pair {
                [k, v] if *k == egl::WIDTH => width = *v,
                [k, v] if *k == egl::HEIGHT => height = *v,
                _ => {}
            }
        }
        let id = self.id();
        self.surfaces.borrow_mut().insert(id, (width, height));
        Ok(id)
    }

    fn create_window_surface(
        &self,
        display: u32,
        _config: u32,
        window: RawWindowHandle,
    ) -> Result<u32, GlError> {
        let RawWindowHandle::AndroidNdk(handle) = window else {
            return Err(GlError::Window(format!("{:?}", window)));
        };
        let key = handle.a_native_window.as_ptr() as usize;
        self.log(EglCall::CreateWindow {
            display,
            window: key,
        });
        if let Some(code) = self.failures.borrow().create_window {
            return Err(GlError::Runtime {
                step: "creating window surface",
                code,
            });
        }
        let size = self.windows.borrow().get(&key).copied().unwrap_or((0, 0));
        let id = self.id();
        self.surfaces.borrow_mut().insert(id, size);
        self.window_surfaces.borrow_mut().insert(id, key);
        Ok(id)
    }

    fn make_current(
        &self,
        _display: u32,
        surface: Option<u32>,
        context: Option<u32>,
    ) -> Result<(), EglCode> {
        self.log(EglCall::MakeCurrent(surface, context));
        match (surface, context) {
            (Some(s), Some(c)) => {
                if !self.surfaces.borrow().contains_key(&s) {
                    return Err(egl::BAD_SURFACE);
                }
                self.current.set(Some((s, c)));
            }
            _ => {
                if let Some(code) = self.failures.borrow().release_current {
                    return Err(code);
                }
                self.current.set(None);
            }
        }
        Ok(())
    }

    fn query_surface(&self, _display: u32, surface: u32, attribute: i32) -> Result<i32, EglCode> {
        self.log(EglCall::Query(surface, attribute));
        let (w, h) = self
            .surfaces
            .borrow()
            .get(&surface)
            .copied()
            .ok_or(egl::BAD_SURFACE)?;
        match attribute {
            a if a == egl::WIDTH => Ok(w),
            a if a == egl::HEIGHT => Ok(h),
            _ => Err(egl::BAD_ATTRIBUTE),
        }
    }

    fn swap_buffers(&self, _display: u32, surface: u32) -> Result<(), EglCode> {
        self.log(EglCall::Swap(surface));
        match self.failures.borrow().swap {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn destroy_surface(&self, _display: u32, surface: u32) -> Result<(), EglCode> {
        self.log(EglCall::DestroySurface(surface));
        self.window_surfaces.borrow_mut().remove(&surface);
        self.surfaces
            .borrow_mut()
            .remove(&surface)
            .map(|_| ())
            .ok_or(egl::BAD_SURFACE)
    }

    fn destroy_context(&self, _display: u32, context: u32) -> Result<(), EglCode> {
        self.log(EglCall::DestroyContext(context));
        if let Some(code) = self.failures.borrow().destroy_context {
            return Err(code);
        }
        self.contexts.borrow_mut().remove(&context);
        Ok(())
    }

    fn terminate(&self, display: u32) -> Result<(), EglCode> {
        self.log(EglCall::Terminate(display));
        self.terminated.borrow_mut().insert(display);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    UseProgram(u32),
    ActiveTexture(u32),
    BindTexture(u32, u32),
    TexParameter(u32, u32, i32),
    Uniform1i(u32, i32),
    BindArrayBuffer(u32),
    BufferData(Vec<f32>),
    VertexAttribPointer(u32, i32),
    EnableVertexAttribArray(u32),
    Viewport(i32, i32, i32, i32),
    Scissor(i32, i32, i32, i32),
    DrawArrays(u32, i32, i32),
}

pub struct FakeGl {
    next_id: Cell<u32>,
    attributes: RefCell<Vec<ActiveVariable>>,
    uniforms: RefCell<Vec<ActiveVariable>>,
    fail_compile: Cell<Option<u32>>,
    fail_link: Cell<bool>,
    errors: RefCell<VecDeque<u32>>,
    shaders: RefCell<HashMap<u32, u32>>,
    programs: RefCell<HashSet<u32>>,
    textures: RefCell<HashSet<u32>>,
    buffers: RefCell<HashSet<u32>>,
    calls: RefCell<Vec<GlCall>>,
}

impl FakeGl {
    /// A GL whose linked programs expose the blit program's interface.
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            attributes: RefCell::new(vec![
                ActiveVariable {
                    name: "a_position".into(),
                    size: 1,
                    gl_type: GL_FLOAT_VEC4,
                },
                ActiveVariable {
                    name: "a_texcoord".into(),
                    size: 1,
                    gl_type: GL_FLOAT_VEC3,
                },
            ]),
            uniforms: RefCell::new(vec![ActiveVariable {
                name: "tex_sampler_0".into(),
                size: 1,
                gl_type: SAMPLER_EXTERNAL_OES,
            }]),
            fail_compile: Cell::new(None),
            fail_link: Cell::new(false),
            errors: RefCell::new(VecDeque::new()),
            shaders: RefCell::new(HashMap::new()),
            programs: RefCell::new(HashSet::new()),
            textures: RefCell::new(HashSet::new()),
            buffers: RefCell::new(HashSet::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn log(&self, call: GlCall) {
        self.calls.borrow_mut().push(call);
    }

    pub fn set_attributes(&self, attributes: Vec<ActiveVariable>) {
        *self.attributes.borrow_mut() = attributes;
    }
    pub fn set_uniforms(&self, uniforms: Vec<ActiveVariable>) {
        *self.uniforms.borrow_mut() = uniforms;
    }
    /// Shaders of GL type `kind` fail to compile.
    pub fn fail_compile(&self, kind: u32) {
        self.fail_compile.set(Some(kind));
    }
    pub fn fail_link(&self) {
        self.fail_link.set(true);
    }
    pub fn push_error(&self, code: u32) {
        self.errors.borrow_mut().push_back(code);
    }
    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }
    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }
    pub fn live_shaders(&self) -> usize {
        self.shaders.borrow().len()
    }
    pub fn live_programs(&self) -> usize {
        self.programs.borrow().len()
    }
    pub fn live_textures(&self) -> usize {
        self.textures.borrow().len()
    }
    pub fn live_buffers(&self) -> usize {
        self.buffers.borrow().len()
    }
    pub fn draw_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, GlCall::DrawArrays(..)))
            .count()
    }
    /// The float data most recently uploaded while `buffer` was bound.
    pub fn buffer_contents(&self, buffer: u32) -> Option<Vec<f32>> {
        let mut bound = 0;
        let mut contents = None;
        for call in self.calls.borrow().iter() {
            match call {
                GlCall::BindArrayBuffer(b) => bound = *b,
                GlCall::BufferData(data) if bound == buffer => contents = Some(data.clone()),
                _ => {}
            }
        }
        contents
    }
}

fn variable_name(list: &[ActiveVariable], name: &str) -> Option<u32> {
    list.iter().position(|v| v.name == name).map(|i| i as u32)
}

impl Gles for FakeGl {
    fn create_shader(&self, kind: u32) -> Result<u32, String> {
        let id = self.id();
        self.shaders.borrow_mut().insert(id, kind);
        Ok(id)
    }
    fn shader_source(&self, _shader: u32, _source: &str) {}
    fn compile_shader(&self, _shader: u32) {}
    fn shader_compile_status(&self, shader: u32) -> bool {
        let kind = self.shaders.borrow().get(&shader).copied();
        kind.is_some() && kind != self.fail_compile.get()
    }
    fn shader_info_log(&self, shader: u32) -> String {
        format!("ERROR: 0:1: shader {} failed", shader)
    }
    fn delete_shader(&self, shader: u32) {
        self.shaders.borrow_mut().remove(&shader);
    }

    fn create_program(&self) -> Result<u32, String> {
        let id = self.id();
        self.programs.borrow_mut().insert(id);
        Ok(id)
    }
    fn attach_shader(&self, _program: u32, _shader: u32) {}
    fn link_program(&self, _program: u32) {}
    fn program_link_status(&self, program: u32) -> bool {
        self.programs.borrow().contains(&program) && !self.fail_link.get()
    }
    fn program_info_log(&self, _program: u32) -> String {
        "varying v_texcoord not written".into()
    }
    fn delete_program(&self, program: u32) {
        self.programs.borrow_mut().remove(&program);
    }
    fn use_program(&self, program: u32) {
        self.log(GlCall::UseProgram(program));
    }

    fn active_attribute_count(&self, _program: u32) -> u32 {
        self.attributes.borrow().len() as u32
    }
    fn active_attribute(&self, _program: u32, index: u32) -> Option<ActiveVariable> {
        self.attributes.borrow().get(index as usize).cloned()
    }
    fn attrib_location(&self, _program: u32, name: &str) -> Option<u32> {
        variable_name(&self.attributes.borrow(), name)
    }
    fn active_uniform_count(&self, _program: u32) -> u32 {
        self.uniforms.borrow().len() as u32
    }
    fn active_uniform(&self, _program: u32, index: u32) -> Option<ActiveVariable> {
        self.uniforms.borrow().get(index as usize).cloned()
    }
    fn uniform_location(&self, _program: u32, name: &str) -> Option<u32> {
        variable_name(&self.uniforms.borrow(), name)
    }
    fn uniform_1i(&self, location: u32, value: i32) {
        self.log(GlCall::Uniform1i(location, value));
    }

    fn create_texture(&self) -> Result<u32, String> {
        let id = self.id();
        self.textures.borrow_mut().insert(id);
        Ok(id)
    }
    fn delete_texture(&self, texture: u32) {
        self.textures.borrow_mut().remove(&texture);
    }
    fn active_texture(&self, unit: u32) {
        self.log(GlCall::ActiveTexture(unit));
    }
    fn bind_texture(&self, target: u32, texture: u32) {
        self.log(GlCall::BindTexture(target, texture));
    }
    fn tex_parameter(&self, target: u32, pname: u32, value: i32) {
        self.log(GlCall::TexParameter(target, pname, value));
    }

    fn create_buffer(&self) -> Result<u32, String> {
        let id = self.id();
        self.buffers.borrow_mut().insert(id);
        Ok(id)
    }
    fn delete_buffer(&self, buffer: u32) {
        self.buffers.borrow_mut().remove(&buffer);
    }
    fn bind_array_buffer(&self, buffer: u32) {
        self.log(GlCall::BindArrayBuffer(buffer));
    }
    fn array_buffer_data(&self, data: &[f32]) {
        self.log(GlCall::BufferData(data.to_vec()));
    }
    fn vertex_attrib_pointer(&self, location: u32, size: i32) {
        self.log(GlCall::VertexAttribPointer(location, size));
    }
    fn enable_vertex_attrib_array(&self, index: u32) {
        self.log(GlCall::EnableVertexAttribArray(index));
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.log(GlCall::Viewport(x, y, width, height));
    }
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        self.log(GlCall::Scissor(x, y, width, height));
    }
    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        self.log(GlCall::DrawArrays(mode, first, count));
    }
    fn get_error(&self) -> u32 {
        self.errors.borrow_mut().pop_front().unwrap_or(glow::NO_ERROR)
    }
}

/// A platform window stand-in: identified by a fake native pointer, with a
/// validity flag the test can flip from "another thread".
#[derive(Debug, Clone)]
pub struct FakeWindow {
    native: usize,
    valid: Arc<AtomicBool>,
}

impl FakeWindow {
    pub fn new(native: usize) -> Self {
        Self {
            native,
            valid: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }
}

impl PartialEq for FakeWindow {
    fn eq(&self, other: &Self) -> bool {
        self.native == other.native
    }
}

impl HasWindowHandle for FakeWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let ptr = NonNull::new(self.native as *mut c_void).ok_or(HandleError::Unavailable)?;
        let raw = RawWindowHandle::AndroidNdk(AndroidNdkWindowHandle::new(ptr));
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl crate::output::OutputSurface for FakeWindow {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

/// Decoder plumbing that records what the renderer asks of it.
pub struct FakeDecoder {
    fail: Option<String>,
    texture: u32,
    notifier: Option<FrameNotifier>,
    updates: Rc<Cell<u32>>,
    released: Rc<Cell<bool>>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self {
            fail: None,
            texture: 0,
            notifier: None,
            updates: Rc::new(Cell::new(0)),
            released: Rc::new(Cell::new(false)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail: Some(reason.to_string()),
            ..Self::new()
        }
    }

    pub fn texture(&self) -> u32 {
        self.texture
    }

    /// The handle the decoder thread would raise.
    pub fn notifier(&self) -> FrameNotifier {
        self.notifier.clone().expect("texture not attached")
    }

    pub fn updates(&self) -> u32 {
        self.updates.get()
    }

    pub fn released(&self) -> bool {
        self.released.get()
    }
}

pub struct FakeExternal {
    updates: Rc<Cell<u32>>,
    released: Rc<Cell<bool>>,
}

impl ExternalTexture for FakeExternal {
    fn update_tex_image(&mut self) -> Result<(), PlaybackError> {
        self.updates.set(self.updates.get() + 1);
        Ok(())
    }
}

impl Drop for FakeExternal {
    fn drop(&mut self) {
        self.released.set(true);
    }
}

impl DecoderSurfaceProvider for FakeDecoder {
    type Target = FakeExternal;

    fn attach_texture(
        &mut self,
        texture: u32,
        notifier: FrameNotifier,
    ) -> Result<FakeExternal, PlaybackError> {
        if let Some(reason) = &self.fail {
            return Err(PlaybackError::Decoder(reason.clone()));
        }
        self.texture = texture;
        self.notifier = Some(notifier);
        Ok(FakeExternal {
            updates: Rc::clone(&self.updates),
            released: Rc::clone(&self.released),
        })
    }
}
