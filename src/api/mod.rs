pub mod envelope;
pub mod routing;
pub mod v1;
