use crate::resource::ServedResource;
use crate::upstream::ClientFactory;
use std::sync::Arc;

/// State for the handlers of one served resource type
#[derive(Clone)]
pub struct AppState {
    pub resource: Arc<ServedResource>,
    pub clients: Arc<dyn ClientFactory>,
}

impl AppState {
    pub fn new(resource: ServedResource, clients: Arc<dyn ClientFactory>) -> Self {
        Self {
            resource: Arc::new(resource),
            clients,
        }
    }
}
