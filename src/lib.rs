// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Health - Campus Health Building Block Service
//!
//! This crate carries the authentication and identity-resolution core of a
//! university COVID-19 health platform: multi-scheme token validation,
//! tiered authorization, identity caching, and app-version-aware
//! configuration resolution. Content CRUD and the persistence engine live
//! in collaborator services.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token validation, tiers, caches, roster, provisioning
//! - `storage` - Persistence contract and the in-memory reference adapter
//! - `version` - Supported-version list and degrade-to-older resolution

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
pub mod version;
