//! etrade-runner - runs a local etrade server and drives the
//! authorization flow against it.

pub mod config;
pub mod display;
pub mod flow;
pub mod server;
