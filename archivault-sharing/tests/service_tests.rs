//! Share service tests: validation, authorization, and rule application.

mod support;

use archivault_sharing::{
    AccessProjection, DocumentRecord, RuleScope, ShareService, SharingError, SharingStore,
    StopSignal,
};
use archivault_types::{
    DocumentId, GroupId, Permission, PermissionSet, RuleId, ShareId, ShareTarget, UserId,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use support::RecordingIndexSink;

fn service() -> (ShareService, Arc<RecordingIndexSink>) {
    let store = SharingStore::open_in_memory().unwrap();
    let index = Arc::new(RecordingIndexSink::default());
    let projection = AccessProjection::new(store.clone(), index.clone());
    (ShareService::new(store, projection), index)
}

fn register(service: &ShareService, owner: &UserId) -> DocumentId {
    let id = DocumentId::new();
    service
        .store()
        .register_document(&DocumentRecord {
            id,
            owner_user_id: owner.clone(),
            deleted: false,
        })
        .unwrap();
    id
}

fn owner() -> UserId {
    UserId::from("owner-1")
}

#[tokio::test]
async fn create_share_with_user() {
    let (service, _) = service();
    let owner = owner();
    let doc = register(&service, &owner);

    let share = service
        .create_share(
            doc,
            &owner,
            ShareTarget::User(UserId::from("alice")),
            PermissionSet::read_only(),
        )
        .await
        .unwrap();

    assert_eq!(share.document_id, doc);
    assert_eq!(share.granted_by, owner);
    assert!(share.permissions.contains(Permission::Read));
}

#[tokio::test]
async fn share_with_owner_rejected() {
    let (service, _) = service();
    let owner = owner();
    let doc = register(&service, &owner);

    let err = service
        .create_share(
            doc,
            &owner,
            ShareTarget::User(owner.clone()),
            PermissionSet::read_only(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");
}

#[tokio::test]
async fn blank_target_rejected() {
    let (service, _) = service();
    let owner = owner();
    let doc = register(&service, &owner);

    let err = service
        .create_share(
            doc,
            &owner,
            ShareTarget::User(UserId::from("   ")),
            PermissionSet::read_only(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");
}

#[tokio::test]
async fn missing_and_deleted_documents_are_not_found() {
    let (service, _) = service();
    let owner = owner();

    let err = service
        .create_share(
            DocumentId::new(),
            &owner,
            ShareTarget::User(UserId::from("alice")),
            PermissionSet::read_only(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SharingError::NotFound(_)), "{err}");

    let doc = DocumentId::new();
    service
        .store()
        .register_document(&DocumentRecord {
            id: doc,
            owner_user_id: owner.clone(),
            deleted: true,
        })
        .unwrap();
    let err = service
        .create_share(
            doc,
            &owner,
            ShareTarget::User(UserId::from("alice")),
            PermissionSet::read_only(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SharingError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn only_owner_can_share() {
    let (service, _) = service();
    let owner = owner();
    let doc = register(&service, &owner);

    let err = service
        .create_share(
            doc,
            &UserId::from("mallory"),
            ShareTarget::User(UserId::from("alice")),
            PermissionSet::read_only(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SharingError::Authorization(_)), "{err}");
}

#[tokio::test]
async fn duplicate_share_rejected() {
    let (service, _) = service();
    let owner = owner();
    let doc = register(&service, &owner);
    let target = ShareTarget::User(UserId::from("alice"));

    service
        .create_share(doc, &owner, target.clone(), PermissionSet::read_only())
        .await
        .unwrap();
    let err = service
        .create_share(doc, &owner, target, PermissionSet::read_only())
        .await
        .unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");
}

// Two concurrent creates can both pass the service-level duplicate check;
// the table's unique constraint must reject the second insert on its own.
#[tokio::test]
async fn store_rejects_second_share_row_for_same_target() {
    let (service, _) = service();
    let owner = owner();
    let doc = register(&service, &owner);
    let target = ShareTarget::User(UserId::from("alice"));

    let share = |id| archivault_sharing::DocumentShare {
        id,
        document_id: doc,
        owner_user_id: owner.clone(),
        target: target.clone(),
        shared_at: chrono::Utc::now(),
        granted_by: owner.clone(),
        permissions: PermissionSet::read_only(),
    };

    service.store().insert_share(&share(ShareId::new())).unwrap();
    let err = service.store().insert_share(&share(ShareId::new())).unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");

    // exactly one row survives
    assert!(service.store().share_for_target(doc, &target).unwrap().is_some());
}

#[tokio::test]
async fn store_rejects_second_rule_row_for_same_target() {
    let (service, _) = service();
    let owner = owner();
    let target = ShareTarget::User(UserId::from("alice"));

    let rule = |id| archivault_sharing::ShareAutomationRule {
        id,
        owner_user_id: owner.clone(),
        target: target.clone(),
        scope: RuleScope::AllDocuments,
        permissions: PermissionSet::read_only(),
    };

    service.store().insert_rule(&rule(RuleId::new())).unwrap();
    let err = service.store().insert_rule(&rule(RuleId::new())).unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");
}

#[tokio::test]
async fn group_target_must_exist_and_be_owned() {
    let (service, _) = service();
    let owner = owner();
    let doc = register(&service, &owner);

    let err = service
        .create_share(
            doc,
            &owner,
            ShareTarget::Group(GroupId::new()),
            PermissionSet::read_only(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");

    let other = UserId::from("other-owner");
    let foreign_group = service
        .create_group(&other, "their team", BTreeSet::new())
        .unwrap();
    let err = service
        .create_share(
            doc,
            &owner,
            ShareTarget::Group(foreign_group.id),
            PermissionSet::read_only(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SharingError::Authorization(_)), "{err}");
}

#[tokio::test]
async fn permissions_always_include_read() {
    let (service, _) = service();
    let owner = owner();
    let doc = register(&service, &owner);

    let write_only: PermissionSet = [Permission::Write].into_iter().collect();
    let share = service
        .create_share(
            doc,
            &owner,
            ShareTarget::User(UserId::from("alice")),
            write_only,
        )
        .await
        .unwrap();
    assert!(share.permissions.contains(Permission::Read));
    assert!(share.permissions.contains(Permission::Write));
}

#[tokio::test]
async fn delete_share_owner_only() {
    let (service, _) = service();
    let owner = owner();
    let doc = register(&service, &owner);

    let share = service
        .create_share(
            doc,
            &owner,
            ShareTarget::User(UserId::from("alice")),
            PermissionSet::read_only(),
        )
        .await
        .unwrap();

    let err = service
        .delete_share(share.id, &UserId::from("mallory"))
        .await
        .unwrap_err();
    assert!(matches!(err, SharingError::Authorization(_)), "{err}");

    service.delete_share(share.id, &owner).await.unwrap();
    assert!(service.store().share(share.id).unwrap().is_none());

    let err = service.delete_share(share.id, &owner).await.unwrap_err();
    assert!(matches!(err, SharingError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn group_mutations_are_owner_only() {
    let (service, _) = service();
    let owner = owner();
    let mallory = UserId::from("mallory");

    let group = service
        .create_group(&owner, "reviewers", BTreeSet::from([UserId::from("alice")]))
        .unwrap();

    let err = service
        .rename_group(group.id, &mallory, "stolen")
        .unwrap_err();
    assert!(matches!(err, SharingError::Authorization(_)), "{err}");

    service.rename_group(group.id, &owner, "auditors").unwrap();
    service
        .add_group_member(group.id, &owner, &UserId::from("bob"))
        .unwrap();
    let fetched = service.store().group(group.id).unwrap().unwrap();
    assert_eq!(fetched.name, "auditors");
    assert_eq!(fetched.member_user_ids.len(), 2);

    service
        .remove_group_member(group.id, &owner, &UserId::from("alice"))
        .unwrap();
    service.delete_group(group.id, &owner).unwrap();
    assert!(service.store().group(group.id).unwrap().is_none());
}

#[tokio::test]
async fn blank_group_name_rejected() {
    let (service, _) = service();
    let err = service
        .create_group(&owner(), "  ", BTreeSet::new())
        .unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");
}

#[tokio::test]
async fn filtered_rule_scope_rejected() {
    let (service, _) = service();
    let err = service
        .create_automation_rule(
            &owner(),
            ShareTarget::User(UserId::from("alice")),
            RuleScope::Filtered,
            PermissionSet::read_only(),
        )
        .unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");
}

#[tokio::test]
async fn duplicate_rule_rejected() {
    let (service, _) = service();
    let owner = owner();
    let target = ShareTarget::User(UserId::from("alice"));

    service
        .create_automation_rule(
            &owner,
            target.clone(),
            RuleScope::AllDocuments,
            PermissionSet::read_only(),
        )
        .unwrap();
    let err = service
        .create_automation_rule(
            &owner,
            target,
            RuleScope::AllDocuments,
            PermissionSet::read_only(),
        )
        .unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");
}

#[tokio::test]
async fn self_targeted_rule_rejected() {
    let (service, _) = service();
    let owner = owner();
    let err = service
        .create_automation_rule(
            &owner,
            ShareTarget::User(owner.clone()),
            RuleScope::AllDocuments,
            PermissionSet::read_only(),
        )
        .unwrap_err();
    assert!(matches!(err, SharingError::Validation(_)), "{err}");
}

#[tokio::test]
async fn rule_applies_to_unshared_documents_only() {
    let (service, index) = service();
    let owner = owner();
    let doc_a = register(&service, &owner);
    let doc_b = register(&service, &owner);
    let doc_c = register(&service, &owner);
    let target = ShareTarget::User(UserId::from("alice"));

    // doc_b is already reachable by the target
    service
        .create_share(doc_b, &owner, target.clone(), PermissionSet::read_only())
        .await
        .unwrap();

    let rule = service
        .create_automation_rule(
            &owner,
            target.clone(),
            RuleScope::AllDocuments,
            PermissionSet::read_only(),
        )
        .unwrap();
    let created = service
        .apply_rule_to_existing_documents(&rule, &StopSignal::new())
        .await
        .unwrap();
    assert_eq!(created, 2);

    for doc in [doc_a, doc_b, doc_c] {
        assert!(service.store().share_for_target(doc, &target).unwrap().is_some());
        let pushed = index.last_push_for(doc).unwrap();
        assert!(pushed.contains(&UserId::from("alice")));
    }
}

#[tokio::test]
async fn stopped_signal_halts_rule_application() {
    let (service, _) = service();
    let owner = owner();
    register(&service, &owner);
    register(&service, &owner);

    let rule = service
        .create_automation_rule(
            &owner,
            ShareTarget::User(UserId::from("alice")),
            RuleScope::AllDocuments,
            PermissionSet::read_only(),
        )
        .unwrap();

    let stop = StopSignal::new();
    stop.stop();
    let created = service
        .apply_rule_to_existing_documents(&rule, &stop)
        .await
        .unwrap();
    assert_eq!(created, 0);
}
