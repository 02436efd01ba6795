//! Lodestone - content-management admin backend core
//!
//! This library provides the RBAC authorization engine for the Lodestone
//! admin backend: the permission/role registries, the per-user permissions
//! cache, the `can` check, and the role mutation guard.
//! It exposes all modules for testing purposes.

pub mod entities;
pub mod errors;
pub mod rbac;
pub mod settings;
pub mod storage;
