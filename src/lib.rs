//! localca - locally trusted development certificates.

pub mod ca;
pub mod cert;
pub mod cli;
pub mod config;
pub mod doctor;
pub mod error;
pub mod exec;
pub mod java;
pub mod name;
pub mod nss;
pub mod platform;
pub mod store;
pub mod trust;

pub use error::{Error, Result};
