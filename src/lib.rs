//! Stockroom API
//!
//! Inventory unit lifecycle, manager-approved reservations, returns and transfers,
//! and the cart to lead to order pipeline for a multi-brand phone and accessory shop.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod notifications;
pub mod services;
pub mod tenancy;

pub use errors::ServiceError;
pub use services::AppServices;
