//! Brokerage - listings, lead capture and admin back office API
//!
//! This library provides the core functionality for a real-estate brokerage
//! site: the public listings browser, natural-language search, the
//! lead-capture chat assistant, lead intake with email notifications, and
//! the admin endpoints for listings, leads and imported drafts.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
