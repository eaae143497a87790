//! In-memory collaborators and fixtures for delivery tests.

use archivault_crypto::{encrypt_artifact, wrap_dek, Dek, MasterKey};
use archivault_delivery::{
    ArtifactStorage, ArtifactStreamer, DeliveryConfig, DocumentDirectory, DocumentView,
};
use archivault_keystore::{ArtifactKeyRecord, KeyFormatVersion, KeyRecordStore};
use archivault_sharing::{ExternalShareManager, SharingStore};
use archivault_tokens::AccessTokenService;
use archivault_types::{Artifact, DocumentId, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MemoryDirectory {
    docs: Mutex<HashMap<DocumentId, DocumentView>>,
}

impl MemoryDirectory {
    pub fn insert(&self, view: DocumentView) {
        self.docs.lock().unwrap().insert(view.id, view);
    }
}

#[async_trait]
impl DocumentDirectory for MemoryDirectory {
    async fn document_view(&self, id: DocumentId) -> Option<DocumentView> {
        self.docs.lock().unwrap().get(&id).cloned()
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn put(&self, path: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_string(), bytes);
    }

    pub fn read_clone(&self, path: &str) -> Vec<u8> {
        self.files.lock().unwrap().get(path).cloned().unwrap()
    }
}

#[async_trait]
impl ArtifactStorage for MemoryStorage {
    async fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
    }

    async fn save(
        &self,
        owner: &UserId,
        document_id: DocumentId,
        artifact: Artifact,
        bytes: &[u8],
    ) -> std::io::Result<String> {
        let path = format!("{owner}/{document_id}/{artifact}");
        self.files
            .lock()
            .unwrap()
            .insert(path.clone(), bytes.to_vec());
        Ok(path)
    }
}

pub struct Fixture {
    pub directory: Arc<MemoryDirectory>,
    pub storage: Arc<MemoryStorage>,
    pub keys: KeyRecordStore,
    pub kek: MasterKey,
    pub tokens: AccessTokenService,
    pub externals: ExternalShareManager,
    pub streamer: ArtifactStreamer,
}

pub fn kek() -> MasterKey {
    MasterKey::from_bytes([7u8; 32])
}

pub fn fixture() -> Fixture {
    fixture_with_config(DeliveryConfig::default())
}

pub fn fixture_with_config(config: DeliveryConfig) -> Fixture {
    let directory = Arc::new(MemoryDirectory::default());
    let storage = Arc::new(MemoryStorage::default());
    let keys = KeyRecordStore::open_in_memory().unwrap();
    let externals = ExternalShareManager::new(SharingStore::open_in_memory().unwrap());
    let streamer = ArtifactStreamer::new(
        directory.clone(),
        storage.clone(),
        keys.clone(),
        kek(),
        AccessTokenService::new(kek()),
        externals.clone(),
        config,
    );
    Fixture {
        directory,
        storage,
        keys,
        kek: kek(),
        tokens: AccessTokenService::new(kek()),
        externals,
        streamer,
    }
}

/// Registers a document whose named artifacts hold `plaintext` encrypted
/// under a fresh DEK, and appends the matching key record.
pub fn store_encrypted(
    fixture: &Fixture,
    document_id: DocumentId,
    owner: &UserId,
    artifact: Artifact,
    plaintext: &[u8],
) -> String {
    let dek = Dek::generate().unwrap();
    let wrapped = wrap_dek(&dek, &fixture.kek, artifact).unwrap();
    let envelope = encrypt_artifact(plaintext, &dek).unwrap();

    let path = format!("{owner}/{document_id}/{artifact}");
    fixture.storage.put(&path, envelope);
    fixture
        .keys
        .append(
            document_id,
            ArtifactKeyRecord {
                artifact,
                wrapped_dek: wrapped.wrapped,
                wrap_nonce: wrapped.nonce,
                algorithm: "AES-256-GCM".to_string(),
                format_version: KeyFormatVersion::V2,
            },
        )
        .unwrap();
    path
}

pub fn view(
    id: DocumentId,
    owner: &UserId,
    encrypted: bool,
    paths: &[(Artifact, &str)],
) -> DocumentView {
    DocumentView {
        id,
        owner_user_id: owner.clone(),
        deleted: false,
        encrypted,
        artifact_paths: paths
            .iter()
            .map(|(artifact, path)| (*artifact, path.to_string()))
            .collect(),
    }
}
