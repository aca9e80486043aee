//! Domain model module declarations.

pub mod annotation;
pub mod credentials;
