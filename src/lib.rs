//! Guestgate - captive-portal access authorization
//!
//! Identifies a guest device by its hardware address, decides whether it
//! already holds an active grant, and otherwise issues it a named login, the
//! shared default login, or a single-use voucher. Modules are public so the
//! integration tests can drive them directly.

pub mod engine;
pub mod entities;
pub mod errors;
pub mod seed;
pub mod settings;
pub mod storage;
pub mod validate;
pub mod web;
pub mod window;
