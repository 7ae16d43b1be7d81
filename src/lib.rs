//! CIN/DIN Lookup API Library
//!
//! Company and director search over the Indian company registry, with a
//! pay-to-unlock flow for director contact details, admin CSV imports and
//! record maintenance.
//!
//! # Modules
//!
//! - `api`: HTTP-facing namespace (handlers, admin, auth, webhooks).
//! - `core`: Domain logic, models and errors.
//! - `integrations`: Payment gateway and email clients.
//! - `admin_handlers`: Admin record and import endpoints.
//! - `auth`: Accounts, sessions and request extractors.
//! - `circuit_breaker`: Circuit breaker for the email client.
//! - `config`: Configuration management.
//! - `csv_import`: CSV parsing and coercion for imports.
//! - `db`: Database connection and migrations.
//! - `db_storage`: Admin record storage and the Postgres unlock store.
//! - `email_client`: Transactional email client and templates.
//! - `errors`: Error handling types.
//! - `gateway_client`: Razorpay orders API client.
//! - `handlers`: Public HTTP handlers and shared state.
//! - `masking`: Contact masking.
//! - `models`: Data models and DTOs.
//! - `reconciliation`: Background recovery of paid but unrecorded orders.
//! - `services`: Registry search service.
//! - `signature`: HMAC signatures for checkout and webhooks.
//! - `unlock`: Pay-to-unlock workflow.
//! - `validation`: CIN/DIN normalization and input validation.
//! - `webhook_handler`: Gateway webhook handler.
//! - `webhook_models`: Gateway webhook payloads.

pub mod api;
pub mod core;
pub mod integrations;

pub mod admin_handlers;
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod csv_import;
pub mod db;
pub mod db_storage;
pub mod email_client;
pub mod errors;
pub mod gateway_client;
pub mod handlers;
pub mod masking;
pub mod models;
pub mod reconciliation;
pub mod services;
pub mod signature;
pub mod unlock;
pub mod validation;
pub mod webhook_handler;
pub mod webhook_models;
