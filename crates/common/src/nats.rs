mod client;
mod managed_stream;
mod middleware;
mod object_store;
mod trace_context;
mod traits;

pub use client::*;
pub use managed_stream::*;
pub use middleware::*;
pub use object_store::*;
pub use trace_context::*;
pub use traits::*;
