//! Signaling relay for browser peers: named rooms plus offer/answer/candidate
//! routing between connections. Media never passes through here.

pub mod config;
pub mod signaling;
