pub mod compositor;
pub mod coordinator;
pub mod dynres;
pub mod framegen;
pub mod mailbox;
pub mod schedule;
pub mod staging;
pub mod surface;
pub mod upscaler;

#[cfg(test)]
mod test_support;

pub use coordinator::{
    preferred_presentation_fps, PresentationInfo, PresentationKind, RendererCoordinator,
    RendererError,
};
pub use surface::{DisplaySurface, OffscreenSurface};
