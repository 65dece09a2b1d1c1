//! Mockhive: a multi-tenant mock-API engine.
//!
//! Declarative endpoint definitions are served as synthetic HTTP responses:
//! routes are matched deterministically, requests validated against
//! per-parameter rules, bodies rendered from templates with synthetic data,
//! and webhooks dispatched asynchronously through a bounded queue. Each
//! tenant can be hosted on its own dedicated listener or behind the shared,
//! path-prefixed listener.

// ===== Core engine modules =====
pub mod engine;
pub mod host;
pub mod matcher;
pub mod model;
pub mod template;
pub mod validation;
pub mod webhook;

// ===== External collaborator interfaces =====
pub mod provider;
pub mod sink;

// ===== Support =====
pub mod config;
pub mod jwt;
