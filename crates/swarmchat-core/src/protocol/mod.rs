//! SwarmChat Protocol Module
//!
//! - `message`: the closed set of session messages
//! - `codec`: JSON wire encoding and validation

pub mod codec;
pub mod message;

pub use codec::{decode, encode};
pub use message::{Message, MessageKind};
