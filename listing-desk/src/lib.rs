//! Listing Desk library
//!
//! This library provides the core functionality for the listing-desk daemon:
//! property listings, image storage, admin sessions and the contact form.
//! The binary entry point is in main.rs.

pub mod api;
pub mod config;
pub mod contact;
pub mod db;
pub mod error;
pub mod property;
pub mod repository;
pub mod server;
pub mod session;
mod sql;
pub mod storage;

pub use error::{Error, Result};
