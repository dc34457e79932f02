//! Types shared by the cookbook server and its clients.

pub mod domain;
pub mod error;
pub mod protocol;
pub mod task;
pub mod text;
