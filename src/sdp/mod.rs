//! SDP session-description construction and parsing (RFC 4566) plus the
//! offer/answer codec selection rules (RFC 3264) that the `Builder` state
//! machine relies on.

pub mod codec;
pub mod types;

pub use codec::{build_offer, encode, negotiate, parse, select_codec, NegotiatedMedia, OfferParams};
pub use types::{Direction, MediaDescription, SdpSession};
