//! Adversarial tests for DEK wrapping (AES-256-GCM under the KEK).
//!
//! Validates that:
//! - Wrap/unwrap round-trips for every artifact kind
//! - The AAD binds the wrap to its artifact (no cross-artifact replay)
//! - Wrong KEK, tampered bytes, and bad lengths all fail closed

use archivault_crypto::{
    unwrap_dek, wrap_dek, CryptoError, Dek, MasterKey, WRAPPED_DEK_SIZE,
};
use archivault_types::Artifact;

fn test_kek() -> MasterKey {
    MasterKey::from_bytes([0x11; 32])
}

#[test]
fn wrap_and_unwrap_roundtrip_all_artifacts() {
    let kek = test_kek();
    for artifact in Artifact::ALL {
        let dek = Dek::generate().unwrap();
        let wrapped = wrap_dek(&dek, &kek, artifact).unwrap();
        assert_eq!(wrapped.wrapped.len(), WRAPPED_DEK_SIZE);

        let unwrapped = unwrap_dek(&wrapped.wrapped, &wrapped.nonce, &kek, artifact).unwrap();
        assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    }
}

#[test]
fn unwrap_with_different_artifact_fails() {
    let kek = test_kek();
    let dek = Dek::generate().unwrap();

    let wrapped = wrap_dek(&dek, &kek, Artifact::File).unwrap();

    let err = unwrap_dek(&wrapped.wrapped, &wrapped.nonce, &kek, Artifact::Thumb).unwrap_err();
    assert!(matches!(err, CryptoError::Integrity));
}

#[test]
fn unwrap_with_wrong_kek_fails() {
    let dek = Dek::generate().unwrap();
    let wrapped = wrap_dek(&dek, &test_kek(), Artifact::File).unwrap();

    let other_kek = MasterKey::from_bytes([0x22; 32]);
    let err = unwrap_dek(&wrapped.wrapped, &wrapped.nonce, &other_kek, Artifact::File).unwrap_err();
    assert!(matches!(err, CryptoError::Integrity));
}

#[test]
fn tampered_wrapped_bytes_detected() {
    let kek = test_kek();
    let dek = Dek::generate().unwrap();
    let mut wrapped = wrap_dek(&dek, &kek, Artifact::Preview).unwrap();

    for position in [0, 31, 32, WRAPPED_DEK_SIZE - 1] {
        let mut bytes = wrapped.wrapped.clone();
        bytes[position] ^= 0xFF;
        let err = unwrap_dek(&bytes, &wrapped.nonce, &kek, Artifact::Preview).unwrap_err();
        assert!(
            matches!(err, CryptoError::Integrity),
            "flipping byte {position} should fail closed"
        );
    }

    // Tampered nonce is equally fatal
    wrapped.nonce[0] ^= 0xFF;
    assert!(unwrap_dek(&wrapped.wrapped, &wrapped.nonce, &kek, Artifact::Preview).is_err());
}

#[test]
fn truncated_wrapped_bytes_rejected() {
    let kek = test_kek();
    let dek = Dek::generate().unwrap();
    let wrapped = wrap_dek(&dek, &kek, Artifact::File).unwrap();

    let err = unwrap_dek(&wrapped.wrapped[..47], &wrapped.nonce, &kek, Artifact::File).unwrap_err();
    assert!(matches!(err, CryptoError::Integrity));

    let err = unwrap_dek(&[], &wrapped.nonce, &kek, Artifact::File).unwrap_err();
    assert!(matches!(err, CryptoError::Integrity));
}

#[test]
fn each_wrap_uses_fresh_nonce() {
    let kek = test_kek();
    let dek = Dek::generate().unwrap();

    let a = wrap_dek(&dek, &kek, Artifact::File).unwrap();
    let b = wrap_dek(&dek, &kek, Artifact::File).unwrap();

    assert_ne!(a.nonce, b.nonce, "each wrap should use a unique nonce");
    assert_ne!(a.wrapped, b.wrapped);
}
