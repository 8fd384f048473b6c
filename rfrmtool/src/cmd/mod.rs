pub mod dump;
pub mod footer;
pub mod info;
pub mod types;
