//! Line protocol spoken by the TFVC annotate tool.
//!
//! The driver talks to the tool over its standard streams, one file at a
//! time, with no pipelining.
//!
//! Submodules:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing;
//!   reads accept `\n` or `\r\n`, writes always end in `\r\n`.
//! - `channel`: framed stdin/stdout pair plus background stderr capture.
//! - `variant`: the named protocol generations, per-field overrides and what
//!   differs between generations.
//! - `grammar`: record and count line parsing.
//! - `classify`: pure mapping of response lines to outcomes.
//! - `handshake`: the credential exchange that opens every batch.
//! - `assembler`: trailing-line normalization and sink delivery.
//! - `session`: per-batch state machine.
//! - `process`: spawning, teardown and exit-status handling of the tool.

pub mod assembler;
pub mod channel;
pub mod classify;
pub mod codec;
pub mod grammar;
pub mod handshake;
pub mod process;
pub mod session;
pub mod variant;
