pub mod batch;
pub mod common;
pub mod info;
pub mod list;
pub mod query;
