use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::session::AudioSession;
use super::session_manager::SessionStore;
use crate::audio::decoder::AudioFormat;
use crate::protocol::crypto::{derive_stream_key, DecryptError, PassthroughKeyUnwrap};

fn session_with_keys() -> AudioSession {
    let mut session = AudioSession::new(AudioFormat::Pcm);
    session.encrypted_key = vec![0x42; 16];
    session.key_message = vec![0x01, 0x02, 0x03];
    session.shared_secret = [0x7F; 32];
    session.iv = [0x11; 16];
    session
}

#[test]
fn plain_key_is_unwrapped_once_and_cached() {
    let session = session_with_keys();
    let calls = Arc::new(AtomicUsize::new(0));

    let counting = {
        let calls = calls.clone();
        move |_msg: &[u8], encrypted: &[u8]| -> Result<[u8; 16], DecryptError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut key = [0u8; 16];
            key.copy_from_slice(&encrypted[..16]);
            Ok(key)
        }
    };

    assert_eq!(session.plain_key(&counting).unwrap(), [0x42; 16]);
    assert_eq!(session.plain_key(&counting).unwrap(), [0x42; 16]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_key_material_is_reported() {
    let session = AudioSession::new(AudioFormat::Pcm);
    let err = session.plain_key(&PassthroughKeyUnwrap).unwrap_err();
    assert!(matches!(err, DecryptError::MissingMaterial(_)));
}

#[test]
fn unwrap_failure_propagates() {
    let session = session_with_keys();
    let failing =
        |_msg: &[u8], _enc: &[u8]| Err::<[u8; 16], _>(DecryptError::KeyUnwrap("refused".into()));
    let err = session.plain_key(&failing).unwrap_err();
    assert!(matches!(err, DecryptError::KeyUnwrap(_)));
}

#[test]
fn stream_key_mixes_in_the_shared_secret() {
    let session = session_with_keys();
    let key = session.stream_key(&PassthroughKeyUnwrap).unwrap();
    assert_eq!(key, derive_stream_key(&[0x42; 16], &[0x7F; 32]));

    let mut other = session_with_keys();
    other.shared_secret = [0x00; 32];
    assert_ne!(key, other.stream_key(&PassthroughKeyUnwrap).unwrap());
}

#[test]
fn store_get_or_default_creates_one_record() {
    let store = SessionStore::new();
    assert!(store.is_empty());

    let first = store.get_or_default("abc");
    let second = store.get_or_default("abc");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.len(), 1);
    assert_eq!(first.format, AudioFormat::Unknown);
}

#[test]
fn store_upsert_replaces() {
    let store = SessionStore::new();
    store.upsert("abc", AudioSession::new(AudioFormat::Alac));

    let replaced = store.upsert("abc", session_with_keys());
    assert_eq!(store.len(), 1);
    assert_eq!(replaced.format, AudioFormat::Pcm);
    assert!(Arc::ptr_eq(&replaced, &store.get("abc").unwrap()));
}

#[test]
fn store_remove() {
    let store = SessionStore::new();
    store.upsert("gone", AudioSession::new(AudioFormat::Pcm));

    assert!(store.remove("gone").is_some());
    assert!(store.remove("gone").is_none());
    assert!(store.get("gone").is_none());
}
