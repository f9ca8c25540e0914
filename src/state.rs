// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::Auth;
use crate::storage::Storage;
use crate::version::VersionResolver;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Auth>,
    pub versions: Arc<VersionResolver>,
    pub storage: Arc<dyn Storage>,
    /// Cookie the web client uses to carry its access token.
    pub auth_cookie_name: Arc<str>,
}

impl AppState {
    pub fn new(
        auth: Arc<Auth>,
        versions: Arc<VersionResolver>,
        storage: Arc<dyn Storage>,
        auth_cookie_name: &str,
    ) -> Self {
        Self {
            auth,
            versions,
            storage,
            auth_cookie_name: Arc::from(auth_cookie_name),
        }
    }
}
