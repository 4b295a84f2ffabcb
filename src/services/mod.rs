pub mod document_processor;
pub mod temp_storage;
pub mod worker;
