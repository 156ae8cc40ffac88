//! End-to-end tests over the framed transport
//!
//! Each test scripts the envelopes a frame-delivery process would send and
//! checks what the tool writes back.
//!
//! Run with: cargo test --test e2e

mod session;

mod router;
mod switching;
