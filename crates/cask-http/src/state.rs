//! Shared state handed to every handler.

use std::sync::Arc;

use cask_cluster::Site;

#[derive(Clone)]
pub struct AppState {
    pub site: Arc<Site>,
}

impl AppState {
    pub fn new(site: Arc<Site>) -> Self {
        Self { site }
    }
}
