//! Ballot file decoding: a BER envelope whose payload is a second BER
//! message, in one of two wire generations.

pub mod ber;
mod decode;
mod error;
pub mod layout;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;

pub use decode::{decode, decode_file, decode_named};
pub use error::DecodeError;
