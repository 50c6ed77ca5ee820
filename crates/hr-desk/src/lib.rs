//! HR operations backend: interview scheduling, monthly reports and ad-hoc
//! queries, each behind role-based section access.

pub mod access;
pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod forms;
pub mod session;
pub mod telemetry;
pub mod web;
pub mod workflows;

pub use error::{AppError, ServiceError};
