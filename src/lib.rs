//! h2core - server-side HTTP/2 protocol core
//!
//! This crate validates the HTTP/2 connection preface, decodes and encodes
//! RFC 7540 frames, routes frames to per-stream state machines and
//! negotiates connection settings. Transport setup is limited to a small
//! blocking TCP server in [`h2::server`].

pub mod h2;
