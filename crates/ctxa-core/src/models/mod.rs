//! Data models for the context adapter

pub mod headers;
pub mod ngsi;
pub mod operation;
pub mod service;

pub use headers::*;
pub use ngsi::*;
pub use operation::*;
pub use service::*;
