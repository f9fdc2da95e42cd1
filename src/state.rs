use crate::config::Settings;
use crate::downloads::DownloadManager;
use crate::store::ItemStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ItemStore>,
    pub downloads: Arc<DownloadManager>,
    pub settings: Settings,
    pub host_url: String,
}

impl AppState {
    pub fn new(settings: Settings, host_url: String) -> Self {
        let store = Arc::new(ItemStore::initialize(settings.item_count));
        let downloads = Arc::new(DownloadManager::new(store.clone(), settings.simulation()));

        Self {
            store,
            downloads,
            settings,
            host_url,
        }
    }
}
