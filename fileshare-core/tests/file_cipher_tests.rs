//! File encryption at rest.

mod support;

use fileshare_core::file_cipher::{content_hash, encrypted_path_for};
use fileshare_core::{FileCipher, ShareError};
use fileshare_crypto::{AesCbcEngine, IV_SIZE, encrypt, generate_iv, generate_key};
use std::fs;
use std::sync::Arc;
use support::SwitchableEngine;

fn cipher() -> FileCipher {
    FileCipher::new(Arc::new(AesCbcEngine))
}

// ── Concrete scenario ──

#[test]
fn helloworld_round_trip_and_wrong_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.txt");
    fs::write(&path, b"HELLOWORLD").unwrap();

    let (encrypted, dek) = cipher().encrypt_file(&path).unwrap();

    assert_eq!(encrypted, dir.path().join("hello.txt.enc"));
    assert!(!path.exists(), "plaintext original must be deleted");
    // IV, then 10 bytes padded to one block.
    assert_eq!(fs::metadata(&encrypted).unwrap().len() as usize, IV_SIZE + 16);

    assert_eq!(cipher().decrypt_file(&encrypted, &dek).unwrap(), b"HELLOWORLD");

    let hash = content_hash(b"HELLOWORLD");
    for _ in 0..64 {
        let other = generate_key().unwrap();
        let err = cipher()
            .decrypt_file_checked(&encrypted, &other, &hash)
            .unwrap_err();
        assert!(matches!(err, ShareError::Cipher(_)), "got {err:?}");

        // Without the hash the padding check catches most wrong keys, and
        // never yields the original.
        if let Ok(garbage) = cipher().decrypt_file(&encrypted, &other) {
            assert_ne!(garbage, b"HELLOWORLD");
        }
    }
}

#[test]
fn plain_iv_and_ciphertext_file_decrypts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.txt.enc");
    let dek = generate_key().unwrap();
    let iv = generate_iv().unwrap();

    let mut body = iv.as_bytes().to_vec();
    body.extend_from_slice(&encrypt(b"HELLOWORLD", &dek, &iv).unwrap());
    fs::write(&path, &body).unwrap();

    assert_eq!(cipher().decrypt_file(&path, &dek).unwrap(), b"HELLOWORLD");
    assert_eq!(
        cipher()
            .decrypt_file_checked(&path, &dek, &content_hash(b"HELLOWORLD"))
            .unwrap(),
        b"HELLOWORLD"
    );
}

// ── encrypt_file ──

#[test]
fn empty_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty");
    fs::write(&path, b"").unwrap();

    let (encrypted, dek) = cipher().encrypt_file(&path).unwrap();
    assert!(cipher().decrypt_file(&encrypted, &dek).unwrap().is_empty());
}

#[test]
fn same_plaintext_encrypts_differently_each_time() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, b"identical contents").unwrap();
    fs::write(&b, b"identical contents").unwrap();

    let (ea, dek_a) = cipher().encrypt_file(&a).unwrap();
    let (eb, dek_b) = cipher().encrypt_file(&b).unwrap();

    assert_ne!(dek_a, dek_b);
    assert_ne!(fs::read(ea).unwrap(), fs::read(eb).unwrap());
}

#[test]
fn missing_input_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = cipher()
        .encrypt_file(&dir.path().join("absent"))
        .unwrap_err();
    assert!(matches!(err, ShareError::Io(_)));
}

#[test]
fn existing_output_is_not_clobbered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc");
    fs::write(&path, b"plaintext").unwrap();
    fs::write(encrypted_path_for(&path), b"someone else's file").unwrap();

    let err = cipher().encrypt_file(&path).unwrap_err();

    assert!(matches!(err, ShareError::Io(_)));
    assert_eq!(fs::read(&path).unwrap(), b"plaintext");
    assert_eq!(
        fs::read(encrypted_path_for(&path)).unwrap(),
        b"someone else's file"
    );
}

#[test]
fn entropy_failure_leaves_original_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc");
    fs::write(&path, b"plaintext").unwrap();

    let engine = Arc::new(SwitchableEngine::default());
    engine.kill_entropy();
    let err = FileCipher::new(engine).encrypt_file(&path).unwrap_err();

    assert!(matches!(err, ShareError::Entropy(_)));
    assert_eq!(fs::read(&path).unwrap(), b"plaintext");
    assert!(!encrypted_path_for(&path).exists());
}

// ── decrypt ──

#[test]
fn missing_encrypted_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let dek = generate_key().unwrap();
    assert!(matches!(
        cipher().decrypt_file(&dir.path().join("x.enc"), &dek),
        Err(ShareError::Io(_))
    ));
}

#[test]
fn truncated_bodies_are_cipher_errors() {
    let (body, dek) = cipher().encrypt_bytes(b"a body spanning two blocks").unwrap();
    assert_eq!(body.len(), IV_SIZE + 32);

    for len in [0, 1, IV_SIZE, IV_SIZE + 15, body.len() - 1] {
        let err = cipher().decrypt_bytes(&body[..len], &dek).unwrap_err();
        assert!(matches!(err, ShareError::Cipher(_)), "len {len}: {err:?}");
    }
}

#[test]
fn any_flipped_byte_is_detected_with_hash() {
    let plaintext = b"integrity matters here";
    let (body, dek) = cipher().encrypt_bytes(plaintext).unwrap();
    let hash = content_hash(plaintext);

    for i in 0..body.len() {
        let mut tampered = body.clone();
        tampered[i] ^= 0x01;
        assert!(
            matches!(
                cipher().decrypt_bytes_checked(&tampered, &dek, &hash),
                Err(ShareError::Cipher(_))
            ),
            "flip at byte {i} went unnoticed"
        );
    }
}

mod prop {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn bytes_round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let (sealed, dek) = cipher().encrypt_bytes(&data).unwrap();
            prop_assert_eq!(cipher().decrypt_bytes(&sealed, &dek).unwrap(), data);
        }
    }
}
