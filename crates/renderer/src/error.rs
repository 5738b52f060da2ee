use thiserror::Error;

/// Problems the engine reports while keeping the rest of the stack running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("mythic layering unavailable: {0}")]
    CapabilityUnavailable(String),
    #[error("shader `{key}` failed to compile: {message}")]
    ShaderCompile { key: String, message: String },
    #[error("no shader registered under `{0}`")]
    UnknownLayerKey(String),
    #[error("rendering context lost")]
    ContextLost,
}
