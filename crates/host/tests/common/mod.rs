//! Common test utilities
#![allow(dead_code)] // Not every test file uses every helper

pub mod harness;

pub use harness::{authed, TestHarness, PASSWD};
