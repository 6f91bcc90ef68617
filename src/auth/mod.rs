//! Authentication Crypto Path
//!
//! Client-side SCRAM-SHA-256 (RFC 7677). The server-side ladder lives with
//! the session layer; this module carries the hashing/signing path and the
//! canonical test vectors that pin it down.

pub mod scram;

pub use scram::{AuthStep, ScramClient};
