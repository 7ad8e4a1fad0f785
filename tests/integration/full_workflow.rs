//! Integration test: full end-to-end workflow.
//!
//! Tests the complete lifecycle against an in-memory ledger:
//! 1. Create and publish primitive DIDs
//! 2. Update a DID and read its history
//! 3. Publish a multi-controller customized DID
//! 4. Transfer it to a new controller with a ticket
//! 5. Issue, declare and revoke a credential
//! 6. Deactivate a DID

use std::sync::Arc;

use chain_did::backend::{CredentialStatus, DocumentStatus};
use chain_did::request::DocumentOperation;
use chain_did::{
    Backend, Did, DidError, DidUrl, Document, DocumentBuilder, Ed25519KeyPair, InMemoryLedger,
    Issuer, KeyRing, TransferTicket,
};

fn new_identity(keys: &mut KeyRing) -> Document {
    let key = Ed25519KeyPair::generate();
    let builder = DocumentBuilder::primitive(&key.public_key_base58()).unwrap();
    keys.insert(builder.default_key_id().unwrap(), key);
    builder.seal(&*keys).unwrap()
}

fn default_key(doc: &Document) -> DidUrl {
    doc.default_key().unwrap().id().clone()
}

fn setup() -> (Arc<InMemoryLedger>, Backend) {
    let ledger = Arc::new(InMemoryLedger::new());
    let backend = Backend::new(ledger.clone());
    (ledger, backend)
}

#[test]
fn full_workflow_publish_to_deactivation() {
    let (ledger, backend) = setup();
    let mut keys = KeyRing::new();

    // ── Step 1: Create and publish primitive DIDs ───────────────────────
    let alice = new_identity(&mut keys);
    let bob = new_identity(&mut keys);
    let carol = new_identity(&mut keys);
    for doc in [&alice, &bob, &carol] {
        backend.publish_document(doc, None, &keys).unwrap();
    }
    assert_eq!(ledger.transaction_count(), 3);

    let resolved = backend.resolve_did(alice.subject(), false).unwrap().unwrap();
    assert_eq!(resolved, alice);
    assert!(resolved.is_valid(&backend).unwrap());

    // ── Step 2: Update alice and read the history ───────────────────────
    let mut builder = DocumentBuilder::edit(&resolved);
    builder
        .add_service("#hub", "Hub", "https://hub.example", None)
        .unwrap();
    let updated = builder.seal(&keys).unwrap();
    backend.publish_document(&updated, None, &keys).unwrap();

    let bio = backend
        .resolve_did_biography(alice.subject(), true, true)
        .unwrap();
    assert_eq!(bio.status(), DocumentStatus::Valid);
    let operations: Vec<_> = bio
        .transactions()
        .iter()
        .map(|tx| tx.request.operation())
        .collect();
    assert_eq!(
        operations,
        vec![DocumentOperation::Update, DocumentOperation::Create]
    );
    let alice = backend.resolve_did(alice.subject(), true).unwrap().unwrap();
    assert!(alice.service(&DidUrl::new(alice.subject(), "hub").unwrap()).is_some());

    // ── Step 3: Publish a 2-of-2 customized DID ─────────────────────────
    let shop_did = Did::new("shop").unwrap();
    let mut builder = DocumentBuilder::customized(shop_did.clone(), &alice).unwrap();
    builder.add_controller(&bob).unwrap();
    builder.set_multisig(2).unwrap();
    let partial = builder.seal(&keys).unwrap();
    assert!(!partial.is_qualified());
    let shop = DocumentBuilder::edit_as(&partial, &bob)
        .unwrap()
        .seal(&keys)
        .unwrap();
    assert!(shop.is_qualified());
    backend
        .publish_document(&shop, Some(&default_key(&alice)), &keys)
        .unwrap();

    let shop = backend.resolve_did(&shop_did, true).unwrap().unwrap();
    assert!(shop.is_valid(&backend).unwrap());
    assert_eq!(shop.quorum(), 2);

    // ── Step 4: Transfer the shop to carol ──────────────────────────────
    let mut ticket = TransferTicket::new(&shop, carol.subject()).unwrap();
    ticket.seal(&shop, &alice, &keys).unwrap();
    ticket.seal(&shop, &bob, &keys).unwrap();
    assert!(ticket.is_valid(&backend).unwrap());

    let transferred = DocumentBuilder::customized(shop_did.clone(), &carol)
        .unwrap()
        .seal(&keys)
        .unwrap();
    backend
        .transfer_did(&transferred, &ticket, &default_key(&carol), &keys)
        .unwrap();

    let shop = backend.resolve_did(&shop_did, true).unwrap().unwrap();
    assert_eq!(shop.controllers(), &[carol.subject().clone()]);
    assert!(shop.is_valid(&backend).unwrap());

    // The ticket was bound to the previous version.
    assert!(!ticket.is_valid(&backend).unwrap());
    let replay = backend
        .transfer_did(&transferred, &ticket, &default_key(&carol), &keys)
        .unwrap_err();
    assert!(matches!(replay, DidError::TicketNotValid(_)));

    // ── Step 5: Issue, declare and revoke a credential ──────────────────
    let issuer = Issuer::new(alice.clone(), None).unwrap();
    let vc = issuer
        .issue_for(bob.subject())
        .id("#passport")
        .credential_type("PassportCredential")
        .property("nationality", "Singapore")
        .seal(&keys)
        .unwrap();
    assert!(vc.is_valid(&backend).unwrap());
    backend
        .declare_credential(&vc, &bob, &default_key(&bob), &keys)
        .unwrap();

    let declared = backend
        .resolve_credential(vc.id(), None, false)
        .unwrap()
        .unwrap();
    assert_eq!(declared, vc);
    assert!(declared.metadata().transaction_id().is_some());
    assert_eq!(
        backend.list_credentials(bob.subject(), None, None).unwrap(),
        vec![vc.id().clone()]
    );

    backend
        .revoke_credential(vc.id(), &alice, &default_key(&alice), &keys)
        .unwrap();
    let revoked = backend
        .resolve_credential(vc.id(), None, true)
        .unwrap()
        .unwrap();
    assert!(revoked.is_revoked());
    assert!(!revoked.is_valid(&backend).unwrap());
    let bio = backend
        .resolve_credential_biography(vc.id(), None, true)
        .unwrap();
    assert_eq!(bio.status(), CredentialStatus::Revoked);

    // ── Step 6: Deactivate bob ──────────────────────────────────────────
    backend
        .deactivate_did(&bob, &default_key(&bob), &keys)
        .unwrap();
    let bob_now = backend.resolve_did(bob.subject(), true).unwrap().unwrap();
    assert!(bob_now.is_deactivated());
    assert!(!bob_now.is_valid(&backend).unwrap());
    let err = backend.publish_document(&bob, None, &keys).unwrap_err();
    assert!(matches!(err, DidError::DocumentDeactivated(_)));
}

#[test]
fn update_on_stale_version_is_rejected() {
    let (ledger, backend) = setup();
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    backend.publish_document(&alice, None, &keys).unwrap();
    let first = backend.resolve_did(alice.subject(), true).unwrap().unwrap();
    let first_txid = first.metadata().transaction_id().unwrap().to_string();

    let mut builder = DocumentBuilder::edit(&first);
    builder
        .add_service("#a", "Hub", "https://a.example", None)
        .unwrap();
    backend
        .publish_document(&builder.seal(&keys).unwrap(), None, &keys)
        .unwrap();

    let mut builder = DocumentBuilder::edit(&first);
    builder
        .add_service("#b", "Hub", "https://b.example", None)
        .unwrap();
    let stale = builder.seal(&keys).unwrap();
    let err = backend
        .update_did(&stale, &first_txid, &default_key(&alice), &keys)
        .unwrap_err();
    assert!(matches!(err, DidError::Ledger { .. }));
    assert_eq!(ledger.transaction_count(), 2);
}

#[test]
fn controller_change_requires_transfer() {
    let (_, backend) = setup();
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    let bob = new_identity(&mut keys);
    backend.publish_document(&alice, None, &keys).unwrap();
    backend.publish_document(&bob, None, &keys).unwrap();

    let did = Did::new("venue").unwrap();
    let doc = DocumentBuilder::customized(did.clone(), &alice)
        .unwrap()
        .seal(&keys)
        .unwrap();
    backend
        .publish_document(&doc, Some(&default_key(&alice)), &keys)
        .unwrap();

    let current = backend.resolve_did(&did, true).unwrap().unwrap();
    let mut builder = DocumentBuilder::edit_as(&current, &alice).unwrap();
    builder.add_controller(&bob).unwrap();
    builder.set_multisig(1).unwrap();
    let widened = builder.seal(&keys).unwrap();
    let err = backend
        .publish_document(&widened, Some(&default_key(&alice)), &keys)
        .unwrap_err();
    assert!(matches!(err, DidError::IllegalUsage(_)));
}
