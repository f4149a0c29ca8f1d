//! Signed, time-bounded bearer tokens.

mod authority;
mod claims;

pub use authority::{IssuedToken, TokenAuthority, SIGNING_ALGORITHM};
pub use claims::TokenClaims;
