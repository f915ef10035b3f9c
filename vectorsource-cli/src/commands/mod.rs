//! CLI subcommands.

pub mod init_config;
pub mod simulate;
