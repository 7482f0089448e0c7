//! Backend abstraction layer
//!
//! Provides the object-safe [`GraphicsBackend`] trait the frame pipeline records into,
//! a wgpu implementation and a recording dummy used for GPU-less runs and tests.

pub mod dummy;
pub mod traits;
pub mod types;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use dummy::{BackendCommand, DummyBackend};
pub use traits::*;
pub use types::*;
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuBackend;
