pub mod api;
pub mod bridge;
pub mod catalog;
pub mod message;
pub mod model;
pub mod retry;
pub mod source;
