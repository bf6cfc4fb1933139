//! # Context Sample App Library
//!
//! This library exposes the modules of the greeting application for integration testing.

pub mod controllers;
pub mod lifecycle;
pub mod model;
pub mod observers;
pub mod services;
