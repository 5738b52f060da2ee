//! The seam between the compositor and whatever actually draws.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::effect::BlendMode;
use crate::registry::ShaderDefinition;
use crate::uniforms::LayerUniforms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("shader compilation failed: {0}")]
    Compile(String),
    #[error("failed to create layer instance: {0}")]
    Instance(String),
    #[error("rendering context lost")]
    ContextLost,
    #[error("surface unavailable: {0}")]
    Surface(String),
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },
}

/// Everything the compositor needs from a GPU.
///
/// Handles are only meaningful to the backend that issued them. Blend state
/// set with [`set_blend`](RenderBackend::set_blend) stays active until
/// [`restore_blend`](RenderBackend::restore_blend) returns it to the default
/// (opaque replace).
pub trait RenderBackend {
    fn viewport(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32);

    fn compile(&mut self, definition: &ShaderDefinition) -> Result<ProgramId, BackendError>;
    fn release_program(&mut self, program: ProgramId);

    fn create_instance(
        &mut self,
        program: ProgramId,
        uniforms: &LayerUniforms,
    ) -> Result<InstanceId, BackendError>;
    fn write_uniforms(&mut self, instance: InstanceId, uniforms: &LayerUniforms);
    fn destroy_instance(&mut self, instance: InstanceId);

    fn begin_frame(&mut self) -> Result<(), BackendError>;
    fn set_blend(&mut self, mode: BlendMode);
    fn draw(&mut self, instance: InstanceId) -> Result<(), BackendError>;
    fn restore_blend(&mut self);
    fn end_frame(&mut self) -> Result<(), BackendError>;

    fn is_context_lost(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Compile { key: String, program: ProgramId },
    ReleaseProgram(ProgramId),
    CreateInstance {
        instance: InstanceId,
        program: ProgramId,
        uniforms: LayerUniforms,
    },
    WriteUniforms {
        instance: InstanceId,
        uniforms: LayerUniforms,
    },
    DestroyInstance(InstanceId),
    BeginFrame,
    SetBlend(BlendMode),
    Draw(InstanceId),
    RestoreBlend,
    EndFrame,
    Resize { width: u32, height: u32 },
}

/// Headless backend that records every call it receives.
///
/// Compile failures and context loss can be injected, which makes it the
/// backend of choice for dry runs and tests.
#[derive(Debug)]
pub struct RecordingBackend {
    viewport: (u32, u32),
    commands: Vec<Command>,
    programs: HashMap<ProgramId, String>,
    instances: HashMap<InstanceId, (ProgramId, LayerUniforms)>,
    failing_keys: HashSet<String>,
    frame_failure: Option<String>,
    context_lost: bool,
    in_frame: bool,
    next_id: u64,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            viewport: (width, height),
            commands: Vec::new(),
            programs: HashMap::new(),
            instances: HashMap::new(),
            failing_keys: HashSet::new(),
            frame_failure: None,
            context_lost: false,
            in_frame: false,
            next_id: 1,
        }
    }

    /// Makes every later `compile` of `key` fail.
    pub fn fail_compile(mut self, key: impl Into<String>) -> Self {
        self.failing_keys.insert(key.into());
        self
    }

    /// Makes the next `begin_frame` fail with a surface error, as an
    /// outdated swapchain would.
    pub fn fail_next_frame(&mut self, reason: impl Into<String>) {
        self.frame_failure = Some(reason.into());
    }

    /// Simulates a lost device: every later frame fails with `ContextLost`.
    pub fn lose_context(&mut self) {
        self.context_lost = true;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn live_instances(&self) -> usize {
        self.instances.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Current uniform block of a live instance.
    pub fn uniforms(&self, instance: InstanceId) -> Option<&LayerUniforms> {
        self.instances.get(&instance).map(|(_, uniforms)| uniforms)
    }

    /// Key of the program a live instance was created from.
    pub fn instance_key(&self, instance: InstanceId) -> Option<&str> {
        let (program, _) = self.instances.get(&instance)?;
        self.programs.get(program).map(String::as_str)
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, Command::Draw(_)))
            .count()
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl RenderBackend for RecordingBackend {
    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.commands.push(Command::Resize { width, height });
    }

    fn compile(&mut self, definition: &ShaderDefinition) -> Result<ProgramId, BackendError> {
        if self.context_lost {
            return Err(BackendError::ContextLost);
        }
        if self.failing_keys.contains(&definition.key) {
            return Err(BackendError::Compile(format!(
                "injected failure for `{}`",
                definition.key
            )));
        }
        let program = ProgramId(self.allocate());
        self.programs.insert(program, definition.key.clone());
        self.commands.push(Command::Compile {
            key: definition.key.clone(),
            program,
        });
        Ok(program)
    }

    fn release_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.commands.push(Command::ReleaseProgram(program));
    }

    fn create_instance(
        &mut self,
        program: ProgramId,
        uniforms: &LayerUniforms,
    ) -> Result<InstanceId, BackendError> {
        if self.context_lost {
            return Err(BackendError::ContextLost);
        }
        if !self.programs.contains_key(&program) {
            return Err(BackendError::UnknownHandle {
                kind: "program",
                id: program.0,
            });
        }
        let instance = InstanceId(self.allocate());
        self.instances.insert(instance, (program, *uniforms));
        self.commands.push(Command::CreateInstance {
            instance,
            program,
            uniforms: *uniforms,
        });
        Ok(instance)
    }

    fn write_uniforms(&mut self, instance: InstanceId, uniforms: &LayerUniforms) {
        if let Some((_, current)) = self.instances.get_mut(&instance) {
            *current = *uniforms;
        }
        self.commands.push(Command::WriteUniforms {
            instance,
            uniforms: *uniforms,
        });
    }

    fn destroy_instance(&mut self, instance: InstanceId) {
        self.instances.remove(&instance);
        self.commands.push(Command::DestroyInstance(instance));
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        if self.context_lost {
            return Err(BackendError::ContextLost);
        }
        if let Some(reason) = self.frame_failure.take() {
            return Err(BackendError::Surface(reason));
        }
        self.in_frame = true;
        self.commands.push(Command::BeginFrame);
        Ok(())
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.commands.push(Command::SetBlend(mode));
    }

    fn draw(&mut self, instance: InstanceId) -> Result<(), BackendError> {
        if self.context_lost {
            return Err(BackendError::ContextLost);
        }
        if !self.in_frame {
            return Err(BackendError::Surface("draw issued outside of a frame".into()));
        }
        if !self.instances.contains_key(&instance) {
            return Err(BackendError::UnknownHandle {
                kind: "instance",
                id: instance.0,
            });
        }
        self.commands.push(Command::Draw(instance));
        Ok(())
    }

    fn restore_blend(&mut self) {
        self.commands.push(Command::RestoreBlend);
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        self.in_frame = false;
        self.commands.push(Command::EndFrame);
        Ok(())
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost
    }
}
