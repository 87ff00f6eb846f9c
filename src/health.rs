pub mod health_checker;
pub mod log_inspector;
pub mod verdict;
