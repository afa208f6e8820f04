//! Interactive inspector for Virtools composition files.
//!
//! The `unvirt` binary reads commands from stdin and drives a [`shell::Shell`]
//! over a `cmo-format` context.

pub mod format;
pub mod logging;
pub mod shell;
pub mod tokenize;
