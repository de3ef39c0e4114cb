mod archival;
mod document;
mod envelope;
mod result;
mod submission;

pub use archival::*;
pub use document::*;
pub use envelope::*;
pub use result::*;
pub use submission::*;
