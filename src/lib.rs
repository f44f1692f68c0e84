//! ghostkernel — reference console shell for the ghost runtime
//!
//! The binary lives in src/main.rs; the console loop is exposed here so the
//! integration tests can drive it without a terminal.

pub mod console;
