pub mod job_locks;
pub mod page_range;
pub mod validation;
