pub mod command_os;
pub mod competing;
pub mod error;
pub(crate) mod output;
pub mod worker_slot;
