//! Stress test: many threads publishing and resolving through one shared
//! backend.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chain_did::{
    Backend, BackendConfig, Document, DocumentBuilder, Ed25519KeyPair, InMemoryLedger, KeyRing,
};

fn new_identity(keys: &mut KeyRing) -> Document {
    let key = Ed25519KeyPair::generate();
    let builder = DocumentBuilder::primitive(&key.public_key_base58()).unwrap();
    keys.insert(builder.default_key_id().unwrap(), key);
    builder.seal(&*keys).unwrap()
}

#[test]
fn stress_concurrent_publish() {
    let ledger = Arc::new(InMemoryLedger::new());
    let backend = Arc::new(Backend::new(ledger.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                let mut keys = KeyRing::new();
                let mut published = Vec::new();
                for _ in 0..10 {
                    let doc = new_identity(&mut keys);
                    backend
                        .publish_document(&doc, None, &keys)
                        .expect("publish should succeed");
                    published.push(doc);
                }
                published
            })
        })
        .collect();

    let mut documents = Vec::new();
    for handle in handles {
        documents.extend(handle.join().expect("thread should not panic"));
    }
    assert_eq!(documents.len(), 80);
    assert_eq!(ledger.transaction_count(), 80);

    for doc in &documents {
        let resolved = backend
            .resolve_did(doc.subject(), false)
            .unwrap()
            .expect("published DID should resolve");
        assert_eq!(&resolved, doc);
    }
}

#[test]
fn stress_concurrent_resolution_served_from_cache() {
    let ledger = Arc::new(InMemoryLedger::new());
    let backend = Arc::new(Backend::new(ledger.clone()));
    let mut keys = KeyRing::new();
    let documents: Vec<_> = (0..16).map(|_| new_identity(&mut keys)).collect();
    for doc in &documents {
        backend.publish_document(doc, None, &keys).unwrap();
    }

    // Warm the cache.
    for doc in &documents {
        backend.resolve_did(doc.subject(), false).unwrap();
    }
    let warmed = ledger.resolve_calls();
    let documents = Arc::new(documents);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let backend = Arc::clone(&backend);
            let documents = Arc::clone(&documents);
            thread::spawn(move || {
                for _ in 0..50 {
                    for doc in documents.iter() {
                        let resolved = backend.resolve_did(doc.subject(), false).unwrap();
                        assert_eq!(resolved.as_ref(), Some(doc));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread should not panic");
    }

    assert_eq!(
        ledger.resolve_calls(),
        warmed,
        "warm resolutions should not reach the ledger"
    );
}

#[test]
fn stress_small_cache_evicts_but_stays_correct() {
    let ledger = Arc::new(InMemoryLedger::new());
    let config = BackendConfig {
        cache_capacity: 4,
        cache_ttl: Duration::from_secs(60),
    };
    let backend = Arc::new(Backend::with_config(ledger.clone(), config));
    let mut keys = KeyRing::new();
    let documents: Vec<_> = (0..12).map(|_| new_identity(&mut keys)).collect();
    for doc in &documents {
        backend.publish_document(doc, None, &keys).unwrap();
    }
    let documents = Arc::new(documents);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let backend = Arc::clone(&backend);
            let documents = Arc::clone(&documents);
            thread::spawn(move || {
                for doc in documents.iter().cycle().take(120) {
                    let resolved = backend.resolve_did(doc.subject(), false).unwrap();
                    assert_eq!(resolved.as_ref(), Some(doc));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread should not panic");
    }

    assert!(backend.cached_entries() <= 4);
}

#[test]
fn stress_disabled_cache_always_reaches_ledger() {
    let ledger = Arc::new(InMemoryLedger::new());
    let config = BackendConfig {
        cache_capacity: 0,
        ..BackendConfig::default()
    };
    let backend = Backend::with_config(ledger.clone(), config);
    let mut keys = KeyRing::new();
    let doc = new_identity(&mut keys);
    backend.publish_document(&doc, None, &keys).unwrap();

    let before = ledger.resolve_calls();
    for _ in 0..25 {
        backend.resolve_did(doc.subject(), false).unwrap();
    }
    assert_eq!(ledger.resolve_calls(), before + 25);
    assert_eq!(backend.cached_entries(), 0);
}
