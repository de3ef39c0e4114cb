mod canonical_document;
mod cleanup_service;
mod journaling_service;
mod preprocessing_service;
mod stage;
mod summary_renderer;

pub use canonical_document::*;
pub use cleanup_service::*;
pub use journaling_service::*;
pub use preprocessing_service::*;
pub use stage::*;
pub use summary_renderer::*;
