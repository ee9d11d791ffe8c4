//! Flow module for the authorization handshake and accounts fetch.

mod client;
mod driver;

pub use client::*;
pub use driver::*;
