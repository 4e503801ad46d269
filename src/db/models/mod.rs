//! Database models split into domain-specific modules.

pub mod feed;
pub mod token;
pub mod user;

pub use feed::*;
pub use token::*;
pub use user::*;
