//! Domain model module declarations.

pub mod attendance;
pub mod session;
pub mod verification;
