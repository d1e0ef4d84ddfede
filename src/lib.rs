#[macro_use]
mod macros;

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dates;
pub mod error;
pub mod realtime;
pub mod remote;
pub mod storage;
pub mod types;
pub mod views;

#[cfg(test)]
pub mod testing;

pub mod metadata {
    include!(concat!(env!("OUT_DIR"), "/pkg_info.rs"));
}
