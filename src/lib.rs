//! Library exports for the video fetch service
//!
//! This module exposes internal components for testing and for the binary.

pub mod config;
pub mod database;
pub mod error;
pub mod fetcher;
pub mod handler;
pub mod model;
pub mod pagination;
pub mod rotator;
pub mod route;
pub mod state;
pub mod youtube;
