//! Side-effecting adapters: filesystem, subprocesses, git, the agent CLI.

pub mod agent;
pub mod config;
pub mod git;
pub mod layout;
pub mod lock;
pub mod process;
pub mod retry;
pub mod spec_file;
pub mod state;
