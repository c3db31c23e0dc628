//! Side-effecting harness operations: filesystem, process execution, tailing.

pub mod config;
pub mod history;
pub mod process;
pub mod stage;
pub mod tail;
