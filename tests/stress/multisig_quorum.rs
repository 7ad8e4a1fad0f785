//! Stress test: customized documents with wide controller sets and
//! partial signatures.

use std::sync::Arc;

use chain_did::{
    Backend, Did, DidError, Document, DocumentBuilder, Ed25519KeyPair, InMemoryLedger, KeyRing,
    TransferTicket,
};

fn new_identity(keys: &mut KeyRing) -> Document {
    let key = Ed25519KeyPair::generate();
    let builder = DocumentBuilder::primitive(&key.public_key_base58()).unwrap();
    keys.insert(builder.default_key_id().unwrap(), key);
    builder.seal(&*keys).unwrap()
}

/// Seal `subject` with controllers[..signers] under an m-of-n threshold.
fn customized(
    subject: &str,
    controllers: &[Document],
    m: usize,
    signers: usize,
    keys: &KeyRing,
) -> Document {
    let mut builder =
        DocumentBuilder::customized(Did::new(subject).unwrap(), &controllers[0]).unwrap();
    for controller in &controllers[1..] {
        builder.add_controller(controller).unwrap();
    }
    builder.set_multisig(m).unwrap();
    let mut doc = builder.seal(keys).unwrap();
    for controller in &controllers[1..signers] {
        doc = DocumentBuilder::edit_as(&doc, controller)
            .unwrap()
            .seal(keys)
            .unwrap();
    }
    doc
}

#[test]
fn stress_every_threshold_of_five_controllers() {
    let ledger = Arc::new(InMemoryLedger::new());
    let backend = Backend::new(ledger.clone());
    let mut keys = KeyRing::new();
    let controllers: Vec<_> = (0..5).map(|_| new_identity(&mut keys)).collect();
    for doc in &controllers {
        backend.publish_document(doc, None, &keys).unwrap();
    }

    for m in 1..=5 {
        for signers in 1..=m {
            let doc = customized(&format!("group{m}x{signers}"), &controllers, m, signers, &keys);
            assert_eq!(doc.quorum(), m);
            assert_eq!(doc.proofs().len(), signers);
            assert_eq!(doc.is_qualified(), signers == m, "m={m} signers={signers}");
            assert!(doc.verify_proofs(&backend).unwrap(), "m={m} signers={signers}");
            assert_eq!(doc.is_genuine(&backend).unwrap(), signers == m);
        }
    }
}

#[test]
fn stress_extra_signature_after_quorum_is_refused() {
    let mut keys = KeyRing::new();
    let controllers: Vec<_> = (0..3).map(|_| new_identity(&mut keys)).collect();
    let doc = customized("trio", &controllers, 2, 2, &keys);
    assert!(doc.is_qualified());

    let err = DocumentBuilder::edit_as(&doc, &controllers[2])
        .unwrap()
        .seal(&keys)
        .unwrap_err();
    assert!(matches!(err, DidError::AlreadySealed));
}

#[test]
fn stress_same_controller_cannot_sign_twice() {
    let mut keys = KeyRing::new();
    let controllers: Vec<_> = (0..3).map(|_| new_identity(&mut keys)).collect();
    let doc = customized("triad", &controllers, 3, 1, &keys);

    let err = DocumentBuilder::edit_as(&doc, &controllers[0])
        .unwrap()
        .seal(&keys)
        .unwrap_err();
    assert!(matches!(err, DidError::AlreadySigned(_)));
}

#[test]
fn stress_partial_document_cannot_be_published() {
    let ledger = Arc::new(InMemoryLedger::new());
    let backend = Backend::new(ledger.clone());
    let mut keys = KeyRing::new();
    let controllers: Vec<_> = (0..3).map(|_| new_identity(&mut keys)).collect();
    for doc in &controllers {
        backend.publish_document(doc, None, &keys).unwrap();
    }

    let partial = customized("unfinished", &controllers, 3, 2, &keys);
    let sign_key = controllers[0].default_key().unwrap().id().clone();
    assert!(backend
        .publish_document(&partial, Some(&sign_key), &keys)
        .is_err());
    assert_eq!(ledger.transaction_count(), 3);
}

#[test]
fn stress_ticket_needs_full_quorum_of_distinct_controllers() {
    let ledger = Arc::new(InMemoryLedger::new());
    let backend = Backend::new(ledger.clone());
    let mut keys = KeyRing::new();
    let controllers: Vec<_> = (0..4).map(|_| new_identity(&mut keys)).collect();
    let buyer = new_identity(&mut keys);
    for doc in controllers.iter().chain([&buyer]) {
        backend.publish_document(doc, None, &keys).unwrap();
    }

    let doc = customized("estate", &controllers, 3, 3, &keys);
    let sign_key = controllers[0].default_key().unwrap().id().clone();
    backend
        .publish_document(&doc, Some(&sign_key), &keys)
        .unwrap();
    let doc = backend.resolve_did(doc.subject(), true).unwrap().unwrap();

    let mut ticket = TransferTicket::new(&doc, buyer.subject()).unwrap();
    for (i, controller) in controllers.iter().take(3).enumerate() {
        assert!(!ticket.is_valid(&backend).unwrap(), "after {i} proofs");
        ticket.seal(&doc, controller, &keys).unwrap();
    }
    assert!(ticket.is_qualified(&doc));
    assert!(ticket.is_valid(&backend).unwrap());
    assert!(matches!(
        ticket.seal(&doc, &controllers[3], &keys).unwrap_err(),
        DidError::AlreadySealed
    ));

    let new_doc = DocumentBuilder::customized(doc.subject().clone(), &buyer)
        .unwrap()
        .seal(&keys)
        .unwrap();
    let wrong_key = controllers[0].default_key().unwrap().id().clone();
    assert!(matches!(
        backend
            .transfer_did(&new_doc, &ticket, &wrong_key, &keys)
            .unwrap_err(),
        DidError::InvalidKey(_)
    ));
    let buyer_key = buyer.default_key().unwrap().id().clone();
    backend
        .transfer_did(&new_doc, &ticket, &buyer_key, &keys)
        .unwrap();
    let moved = backend.resolve_did(doc.subject(), true).unwrap().unwrap();
    assert!(moved.has_controller(buyer.subject()));
    assert_eq!(moved.quorum(), 1);
}
