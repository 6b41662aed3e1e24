//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into to-do use cases.
//! - Keep the CLI decoupled from documents and query syntax.

pub mod task_service;
