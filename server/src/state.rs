use crate::assets::AssetStore;
use crate::database::RecordStore;
use crate::service::PhotoService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub photos: Arc<PhotoService>,
}

impl AppState {
    pub fn new(records: Arc<dyn RecordStore>, assets: Arc<dyn AssetStore>) -> Self {
        AppState {
            photos: Arc::new(PhotoService::new(records, assets)),
        }
    }
}
