//! Callback handles and the replicated registry that stores them.

mod handle;
mod registry;

pub use handle::{Arguments, Callback, CallbackHandle, TypedCallback};
pub use registry::CallbackRegistry;
