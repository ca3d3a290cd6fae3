//! StateSet AvaTax adapter
//!
//! Computes sales tax for a storefront through the Avalara AvaTax REST API:
//! maps orders to tax documents, caches single-address rates, records
//! committed transactions and keeps them in step with the order lifecycle.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod avatax;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod models;
pub mod retry;
pub mod services;

pub use config::AvalaraConfig;
pub use errors::ServiceError;
pub use events::{process_events, EventSender, OrderEvent, TaxLifecycleHooks};
pub use services::{build_provider, TaxProvider};
