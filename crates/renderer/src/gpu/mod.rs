//! wgpu implementation of [`RenderBackend`](crate::RenderBackend).
//!
//! - `context` owns the instance, device and window surface and reconfigures
//!   the swapchain on resize.
//! - `pipeline` compiles the GLSL programs through naga inside error scopes
//!   and caches one render pipeline per program, blend mode and format.
//! - `backend` hands out per-layer uniform buffers and records one render
//!   pass per layer on top of the cleared base colour.

mod backend;
mod context;
mod pipeline;

pub use backend::WgpuBackend;
pub use context::SurfaceOptions;
