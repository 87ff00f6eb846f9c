pub mod binary_metadata;
pub mod thread_context;
pub mod threads;
