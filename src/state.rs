use crate::engine::SyncHandle;
use crate::submit::Submitter;
use crate::ui::HtmlPresenter;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub sync: SyncHandle,
    pub submitter: Arc<Submitter>,
    pub presenter: Arc<HtmlPresenter>,
}

impl AppState {
    pub fn new(sync: SyncHandle, submitter: Submitter, presenter: Arc<HtmlPresenter>) -> Self {
        Self {
            sync,
            submitter: Arc::new(submitter),
            presenter,
        }
    }
}
