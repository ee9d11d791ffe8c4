//! Server module for process spawning and output supervision.

mod process;
mod supervisor;

pub use process::*;
pub use supervisor::*;
