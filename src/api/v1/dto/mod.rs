pub mod caller;
pub mod service;
