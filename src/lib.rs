//! Staffgate Backend Library
//!
//! Core components for the Staffgate HR platform backend: credential
//! verification, sign-in flows, session tokens, and role-gated routing.

pub mod api;
pub mod auth;
pub mod db;
pub mod user;
