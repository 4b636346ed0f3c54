#![allow(dead_code)]

pub mod builders;
pub mod db;

pub use builders::{device_mac, AccessForm};
pub use db::{engine_for, seed_vouchers, TestDb};
