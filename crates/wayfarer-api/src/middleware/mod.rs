//! HTTP middleware shared by every route
//!
//! Authentication and role checks live in [`crate::auth::middleware`].
//!
//! Author: hephaex@gmail.com

pub mod security_headers;

pub use security_headers::security_headers;
