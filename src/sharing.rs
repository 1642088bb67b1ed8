//! Tokenized, optionally expiring and access-limited document grants.
//!
//! Every resolution failure (unknown, expired, exhausted or revoked) reports
//! the same `NotFound` so a token holder learns nothing about why.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::generate_token;
use crate::db::RecordStore;
use crate::error::{CoreError, CoreResult};
use crate::models::{stored_now, Document, ShareLink};

pub const SHARE_LINK_UNAVAILABLE: &str = "Share link not found or expired";
pub const MAX_EXPIRY_DAYS: u32 = 365;

/// Options for a new link. Both limits are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShareLinkOptions {
    pub expires_in_days: Option<u32>,
    pub max_accesses: Option<u32>,
}

impl ShareLinkOptions {
    fn validate(&self) -> CoreResult<()> {
        if let Some(days) = self.expires_in_days {
            if !(1..=MAX_EXPIRY_DAYS).contains(&days) {
                return Err(CoreError::Validation(format!(
                    "expires_in_days must be between 1 and {MAX_EXPIRY_DAYS}"
                )));
            }
        }
        if self.max_accesses == Some(0) {
            return Err(CoreError::Validation("max_accesses must be at least 1".into()));
        }
        Ok(())
    }
}

pub struct ShareLinkManager {
    store: Arc<dyn RecordStore>,
}

impl ShareLinkManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        caller_id: Uuid,
        document_id: Uuid,
        options: ShareLinkOptions,
    ) -> CoreResult<ShareLink> {
        self.owned_document(caller_id, document_id)?;
        options.validate()?;

        let now = stored_now();
        let link = ShareLink {
            id: Uuid::new_v4(),
            document_id,
            token: generate_token(),
            created_at: now,
            expires_at: options
                .expires_in_days
                .map(|days| now + Duration::days(i64::from(days))),
            max_accesses: options.max_accesses,
            access_count: 0,
        };
        self.store.insert_share_link(&link)?;

        tracing::info!(
            share_link_id = %link.id,
            document_id = %document_id,
            expires_at = ?link.expires_at,
            max_accesses = ?link.max_accesses,
            "Share link created"
        );
        Ok(link)
    }

    /// Count one access and return the shared document.
    pub fn resolve(&self, token: &str) -> CoreResult<Document> {
        let Some(link) = self.store.consume_share_link(token, &Utc::now())? else {
            return Err(unavailable());
        };
        let doc = self
            .store
            .get_document(&link.document_id)?
            .ok_or_else(unavailable)?;

        tracing::info!(
            share_link_id = %link.id,
            access_count = link.access_count,
            "Share link resolved"
        );
        Ok(doc)
    }

    pub fn revoke(&self, caller_id: Uuid, link_id: Uuid) -> CoreResult<()> {
        let link = self
            .store
            .get_share_link(&link_id)?
            .ok_or_else(unavailable)?;
        self.owned_document(caller_id, link.document_id)
            .map_err(|_| unavailable())?;

        if !self.store.delete_share_link(&link_id)? {
            return Err(unavailable());
        }
        tracing::info!(share_link_id = %link_id, "Share link revoked");
        Ok(())
    }

    /// Links for an owned document, newest first.
    pub fn list_for_document(&self, caller_id: Uuid, document_id: Uuid) -> CoreResult<Vec<ShareLink>> {
        self.owned_document(caller_id, document_id)?;
        Ok(self.store.list_share_links_for_document(&document_id)?)
    }

    /// Delete links that can no longer resolve.
    pub fn purge_inactive(&self) -> CoreResult<usize> {
        let purged = self.store.purge_inactive_share_links(&Utc::now())?;
        if purged > 0 {
            tracing::info!(purged, "Purged inactive share links");
        }
        Ok(purged)
    }

    fn owned_document(&self, caller_id: Uuid, document_id: Uuid) -> CoreResult<Document> {
        match self.store.get_document(&document_id)? {
            Some(doc) if doc.owner_id == caller_id => Ok(doc),
            _ => Err(CoreError::not_found("Document")),
        }
    }
}

fn unavailable() -> CoreError {
    CoreError::NotFound(SHARE_LINK_UNAVAILABLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, SqliteStore};
    use crate::models::enums::{ExtractionStatus, SummaryStatus};

    fn seed(store: &dyn RecordStore, owner: Uuid) -> Document {
        let doc = Document {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: "Discharge letter".into(),
            category: "letters".into(),
            tags: vec![],
            file_ref: "d.txt".into(),
            uploaded_at: Utc::now(),
            extracted_text: Some("Discharged home".into()),
            extraction_status: ExtractionStatus::Completed,
            extraction_error: None,
            summary: None,
            summary_status: SummaryStatus::None,
            summary_error: None,
        };
        store.insert_document(&doc).unwrap();
        doc
    }

    fn setup() -> (ShareLinkManager, Arc<dyn RecordStore>, Uuid, Document) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        let doc = seed(store.as_ref(), owner);
        (ShareLinkManager::new(store.clone()), store, owner, doc)
    }

    fn is_unavailable(err: &CoreError) -> bool {
        matches!(err, CoreError::NotFound(what) if what == SHARE_LINK_UNAVAILABLE)
    }

    #[test]
    fn max_accesses_resolves_exactly_n_times() {
        let (mgr, _, owner, doc) = setup();
        let link = mgr
            .create(
                owner,
                doc.id,
                ShareLinkOptions {
                    max_accesses: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();

        for _ in 0..3 {
            assert_eq!(mgr.resolve(&link.token).unwrap().id, doc.id);
        }
        assert!(is_unavailable(&mgr.resolve(&link.token).unwrap_err()));
    }

    #[test]
    fn concurrent_resolution_respects_ceiling() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let owner = Uuid::new_v4();
        let doc = seed(store.as_ref(), owner);
        let mgr = Arc::new(ShareLinkManager::new(store));
        let link = mgr
            .create(
                owner,
                doc.id,
                ShareLinkOptions {
                    max_accesses: Some(5),
                    ..Default::default()
                },
            )
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let mgr = mgr.clone();
                let token = link.token.clone();
                std::thread::spawn(move || mgr.resolve(&token).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 5);
    }

    #[test]
    fn past_expiry_never_resolves() {
        let (mgr, store, _, doc) = setup();
        let link = ShareLink {
            id: Uuid::new_v4(),
            document_id: doc.id,
            token: generate_token(),
            created_at: Utc::now() - Duration::days(2),
            expires_at: Some(Utc::now() - Duration::seconds(1)),
            max_accesses: None,
            access_count: 0,
        };
        store.insert_share_link(&link).unwrap();
        assert!(is_unavailable(&mgr.resolve(&link.token).unwrap_err()));
    }

    #[test]
    fn revoked_link_is_not_found() {
        let (mgr, _, owner, doc) = setup();
        let link = mgr.create(owner, doc.id, ShareLinkOptions::default()).unwrap();
        assert!(mgr.resolve(&link.token).is_ok());

        mgr.revoke(owner, link.id).unwrap();
        assert!(is_unavailable(&mgr.resolve(&link.token).unwrap_err()));
        assert!(mgr.revoke(owner, link.id).is_err());
    }

    #[test]
    fn only_owner_can_manage_links() {
        let (mgr, _, owner, doc) = setup();
        let stranger = Uuid::new_v4();
        assert!(matches!(
            mgr.create(stranger, doc.id, ShareLinkOptions::default()),
            Err(CoreError::NotFound(_))
        ));
        let link = mgr.create(owner, doc.id, ShareLinkOptions::default()).unwrap();
        assert!(mgr.revoke(stranger, link.id).is_err());
        assert!(mgr.list_for_document(stranger, doc.id).is_err());
        assert_eq!(mgr.list_for_document(owner, doc.id).unwrap().len(), 1);
    }

    #[test]
    fn option_bounds_validated() {
        let (mgr, _, owner, doc) = setup();
        for options in [
            ShareLinkOptions {
                expires_in_days: Some(0),
                max_accesses: None,
            },
            ShareLinkOptions {
                expires_in_days: Some(366),
                max_accesses: None,
            },
            ShareLinkOptions {
                expires_in_days: None,
                max_accesses: Some(0),
            },
        ] {
            assert!(matches!(
                mgr.create(owner, doc.id, options),
                Err(CoreError::Validation(_))
            ));
        }
        let link = mgr
            .create(
                owner,
                doc.id,
                ShareLinkOptions {
                    expires_in_days: Some(7),
                    max_accesses: Some(1),
                },
            )
            .unwrap();
        let expires = link.expires_at.unwrap();
        assert_eq!((expires - link.created_at).num_days(), 7);
    }

    #[test]
    fn purge_removes_exhausted_links() {
        let (mgr, _, owner, doc) = setup();
        let once = mgr
            .create(
                owner,
                doc.id,
                ShareLinkOptions {
                    max_accesses: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        let open = mgr.create(owner, doc.id, ShareLinkOptions::default()).unwrap();
        mgr.resolve(&once.token).unwrap();

        assert_eq!(mgr.purge_inactive().unwrap(), 1);
        let remaining = mgr.list_for_document(owner, doc.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, open.id);
    }
}
