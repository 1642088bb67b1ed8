//! Application state shared by every HTTP handler and background task.
//!
//! All collaborators are constructed by the caller and injected, so tests
//! can swap in `MemoryStore` and scripted extraction/summarization.

use std::sync::Arc;

use crate::appointment::AppointmentLog;
use crate::auth::{AccountService, TotpVerifier};
use crate::config::Config;
use crate::db::RecordStore;
use crate::pipeline::{DocumentPipeline, Summarizer, TextExtractor};
use crate::sharing::ShareLinkManager;
use crate::storage::FileStore;

pub struct CoreState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub files: Arc<FileStore>,
    pub pipeline: DocumentPipeline,
    pub shares: ShareLinkManager,
    pub appointments: AppointmentLog,
    pub accounts: AccountService,
}

impl CoreState {
    pub fn new(
        config: Config,
        store: Arc<dyn RecordStore>,
        files: Arc<FileStore>,
        extractor: Arc<dyn TextExtractor>,
        summarizer: Arc<dyn Summarizer>,
        totp: Option<Arc<dyn TotpVerifier>>,
    ) -> Self {
        let pipeline = DocumentPipeline::new(
            store.clone(),
            files.clone(),
            extractor,
            summarizer,
            config.stage_timeout,
        );
        let accounts = AccountService::new(
            store.clone(),
            config.session_ttl,
            totp,
            config.password_iterations,
        );

        Self {
            shares: ShareLinkManager::new(store.clone()),
            appointments: AppointmentLog::new(store.clone()),
            pipeline,
            accounts,
            files,
            store,
            config,
        }
    }
}
