//! # fedwallet invite codes
//!
//! Parsing and encoding of federation invite codes. An invite code is the
//! `fed1` prefix followed by a URL-safe base64 payload. Payloads that decode
//! to a JSON [`InvitePayload`] yield a descriptor carrying the federation id
//! and guardian endpoints; any other payload in the base64 alphabet is kept
//! opaque and resolved by the wallet backend at join time.
//!
//! No network I/O happens here.

pub mod error;
pub mod code;

pub use error::{InviteError, InviteResult};
pub use code::{FederationDescriptor, InviteCode, InvitePayload, INVITE_PREFIX};
