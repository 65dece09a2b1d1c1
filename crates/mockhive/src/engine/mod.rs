//! The serving and dispatch engine: request context capture, candidate
//! selection, validation orchestration, response selection/rendering, and
//! the shared-listener multi-tenant dispatcher.

pub mod context;
pub mod dispatcher;
pub mod processor;
pub mod respond;
pub mod selection;
