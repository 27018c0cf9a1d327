//! Authentication and authorization for Liaison
//!
//! Provides:
//! - JWT session token generation and validation
//! - The capability gate deciding resource access
//!
//! Password hashing lives with the identity store, which owns the records
//! the hashes are stored on.

pub mod gate;
pub mod jwt;

pub use gate::{authorize, Credential};
pub use jwt::{
    extract_token_from_header, extract_token_from_url, Claims, JwtValidator, TokenInput,
    TokenValidationResult,
};
