//! End-to-end scenario: sharing mutations drive the index projection while
//! the delivery path enforces token scoping and the NotFound collapse.

mod support;

use archivault_delivery::NotFound;
use archivault_sharing::{
    AccessProjection, DocumentRecord, SearchIndexSink, ShareService, SharingResult,
    SharingStore,
};
use archivault_types::{
    Artifact, DocumentId, PermissionSet, ShareTarget, UserId,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use support::{fixture, store_encrypted, view};

#[derive(Default)]
struct RecordingIndexSink {
    pushes: Mutex<Vec<(DocumentId, BTreeSet<UserId>)>>,
}

impl RecordingIndexSink {
    fn last(&self) -> BTreeSet<UserId> {
        self.pushes.lock().unwrap().last().map(|(_, s)| s.clone()).unwrap()
    }
}

#[async_trait]
impl SearchIndexSink for RecordingIndexSink {
    async fn update_document_access(
        &self,
        document_id: DocumentId,
        allowed_user_ids: BTreeSet<UserId>,
    ) -> SharingResult<()> {
        self.pushes.lock().unwrap().push((document_id, allowed_user_ids));
        Ok(())
    }
}

fn users(ids: &[&str]) -> BTreeSet<UserId> {
    ids.iter().map(|id| UserId::from(*id)).collect()
}

#[tokio::test]
async fn upload_share_and_deliver() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let u1 = UserId::from("u1");

    // sharing side
    let store = SharingStore::open_in_memory().unwrap();
    let index = Arc::new(RecordingIndexSink::default());
    let projection = AccessProjection::new(store.clone(), index.clone());
    let service = ShareService::new(store, projection);

    // delivery side: u1 uploads an encrypted document with a file artifact
    let f = fixture();
    let doc = DocumentId::new();
    let path = store_encrypted(&f, doc, &u1, Artifact::File, b"the archived pdf");
    f.directory.insert(view(doc, &u1, true, &[(Artifact::File, &path)]));
    service
        .store()
        .register_document(&DocumentRecord {
            id: doc,
            owner_user_id: u1.clone(),
            deleted: false,
        })
        .unwrap();

    // share with group G1 = {u2, u3}
    let g1 = service
        .create_group(&u1, "g1", users(&["u2", "u3"]))
        .unwrap();
    let group_share = service
        .create_share(doc, &u1, ShareTarget::Group(g1.id), PermissionSet::read_only())
        .await
        .unwrap();
    assert_eq!(index.last(), users(&["u2", "u3"]));
    let view_row = service.store().view(doc).unwrap().unwrap();
    assert_eq!(view_row.effective_user_ids, users(&["u1", "u2", "u3"]));

    // add a direct share with u4
    service
        .create_share(
            doc,
            &u1,
            ShareTarget::User(UserId::from("u4")),
            PermissionSet::read_only(),
        )
        .await
        .unwrap();
    assert_eq!(index.last(), users(&["u2", "u3", "u4"]));

    // remove the group share; only u4 keeps a route in
    service.delete_share(group_share.id, &u1).await.unwrap();
    assert_eq!(index.last(), users(&["u4"]));
    let view_row = service.store().view(doc).unwrap().unwrap();
    assert_eq!(view_row.effective_user_ids, users(&["u1", "u4"]));

    // a token scoped to the thumb cannot fetch anything: no thumb stored
    let thumb_token =
        f.tokens
            .issue_artifact_token(doc, Artifact::Thumb, Utc::now() + Duration::minutes(5));
    assert_eq!(
        f.streamer.get_artifact_with_token(&thumb_token).await.unwrap_err(),
        NotFound
    );

    // correctly scoped but expired
    let expired_token =
        f.tokens
            .issue_artifact_token(doc, Artifact::File, Utc::now() - Duration::minutes(5));
    assert_eq!(
        f.streamer.get_artifact_with_token(&expired_token).await.unwrap_err(),
        NotFound
    );

    // valid token on the encrypted document round-trips the plaintext
    let token =
        f.tokens
            .issue_artifact_token(doc, Artifact::File, Utc::now() + Duration::minutes(5));
    let payload = f.streamer.get_artifact_with_token(&token).await.unwrap();
    assert_eq!(payload.bytes, b"the archived pdf");

    // encrypted document with a missing key record still collapses
    let orphan = DocumentId::new();
    let orphan_path = format!("{u1}/{orphan}/file");
    f.storage.put(&orphan_path, f.storage.read_clone(&path));
    f.directory
        .insert(view(orphan, &u1, true, &[(Artifact::File, &orphan_path)]));
    let orphan_token =
        f.tokens
            .issue_artifact_token(orphan, Artifact::File, Utc::now() + Duration::minutes(5));
    assert_eq!(
        f.streamer.get_artifact_with_token(&orphan_token).await.unwrap_err(),
        NotFound
    );
}
