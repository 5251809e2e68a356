#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Shared pieces of the `dragnet` workspace: the wire types both sides of
//! the coordinator protocol exchange, and the tracing bootstrap used by the
//! server and client binaries.

pub mod logging;
pub mod wire;
