pub mod health;
pub mod jobs;
pub mod processing;
pub mod types;
pub mod validation;
