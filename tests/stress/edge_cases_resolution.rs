//! Edge cases for resolution: forged transactions, out-of-order
//! revocations and misbehaving transports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use chain_did::backend::CredentialStatus;
use chain_did::{
    Backend, CredentialRequest, Did, DidError, DidUrl, Document, DocumentBuilder,
    DocumentRequest, Ed25519KeyPair, ErrorKind, InMemoryLedger, Issuer, KeyRing, LedgerTransport,
    Result, TransferTicket,
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

/// Answers every resolve with a canned reply built from the request.
struct Scripted<F> {
    reply: F,
}

impl<F> LedgerTransport for Scripted<F>
where
    F: Fn(&Value) -> Value + Send + Sync,
{
    fn resolve(&self, request: &str) -> Result<String> {
        let request: Value = serde_json::from_str(request)?;
        Ok((self.reply)(&request).to_string())
    }

    fn submit(&self, _payload: &str, _memo: &str) -> Result<()> {
        Err(DidError::Transport("read-only transport".into()))
    }
}

/// Fails the first `failures` resolves, then delegates.
struct Flaky {
    inner: Arc<InMemoryLedger>,
    failures: AtomicUsize,
}

impl LedgerTransport for Flaky {
    fn resolve(&self, request: &str) -> Result<String> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DidError::Transport("connection reset".into()));
        }
        self.inner.resolve(request)
    }

    fn submit(&self, payload: &str, memo: &str) -> Result<()> {
        self.inner.submit(payload, memo)
    }
}

#[test]
fn edge_unknown_entities_resolve_to_none() {
    let (_, backend) = setup();
    let did = Did::new("ghost").unwrap();
    assert!(backend.resolve_did(&did, false).unwrap().is_none());
    let id = DidUrl::new(&did, "vc").unwrap();
    assert!(backend.resolve_credential(&id, None, false).unwrap().is_none());
    assert!(backend.list_credentials(&did, None, None).unwrap().is_empty());
}

#[test]
fn edge_forged_deactivation_fails_resolution() {
    let (ledger, backend) = setup();
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    let bob = new_identity(&mut keys);
    backend.publish_document(&alice, None, &keys).unwrap();
    backend.publish_document(&bob, None, &keys).unwrap();

    let genuine =
        DocumentRequest::deactivate(&alice, &default_key(&alice), &keys, &backend).unwrap();
    let other = DocumentRequest::deactivate(&bob, &default_key(&bob), &keys, &backend).unwrap();
    let mut forged: Value = serde_json::from_str(&genuine.to_json(true).unwrap()).unwrap();
    forged["proof"]["signature"] = json!(other.proof().signature());
    ledger.submit(&forged.to_string(), "").unwrap();

    let err = backend.resolve_did(alice.subject(), true).unwrap_err();
    assert!(matches!(err, DidError::Resolution(_)));
    assert_eq!(err.kind(), ErrorKind::ResolutionFailure);

    // Other DIDs are unaffected.
    assert!(backend.resolve_did(bob.subject(), true).unwrap().is_some());
}

#[test]
fn edge_deactivation_by_authorized_did() {
    let (_, backend) = setup();
    let mut keys = KeyRing::new();
    let guardian = new_identity(&mut keys);
    let alice = new_identity(&mut keys);
    backend.publish_document(&guardian, None, &keys).unwrap();

    let mut builder = DocumentBuilder::edit(&alice);
    builder.authorize_did("#recovery", &guardian, None).unwrap();
    let alice = builder.seal(&keys).unwrap();
    backend.publish_document(&alice, None, &keys).unwrap();

    let stranger = new_identity(&mut keys);
    backend.publish_document(&stranger, None, &keys).unwrap();
    assert!(matches!(
        backend
            .deactivate_did_by(alice.subject(), &stranger, &default_key(&stranger), &keys)
            .unwrap_err(),
        DidError::InvalidKey(_)
    ));

    backend
        .deactivate_did_by(alice.subject(), &guardian, &default_key(&guardian), &keys)
        .unwrap();
    let resolved = backend.resolve_did(alice.subject(), true).unwrap().unwrap();
    assert!(resolved.is_deactivated());
    assert!(matches!(
        backend
            .deactivate_did_by(alice.subject(), &guardian, &default_key(&guardian), &keys)
            .unwrap_err(),
        DidError::DocumentDeactivated(_)
    ));
}

#[test]
fn edge_stranger_revocation_is_ignored_or_rejected() {
    let (ledger, backend) = setup();
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    let mallory = new_identity(&mut keys);
    backend.publish_document(&alice, None, &keys).unwrap();
    backend.publish_document(&mallory, None, &keys).unwrap();

    let vc = Issuer::new(alice.clone(), None)
        .unwrap()
        .issue_for(alice.subject())
        .id("#email")
        .property("email", "alice@example.com")
        .seal(&keys)
        .unwrap();
    backend
        .declare_credential(&vc, &alice, &default_key(&alice), &keys)
        .unwrap();

    // The backend refuses to revoke on behalf of a stranger.
    assert!(matches!(
        backend
            .revoke_credential(vc.id(), &mallory, &default_key(&mallory), &keys)
            .unwrap_err(),
        DidError::IllegalUsage(_)
    ));

    // A raw revocation reaching the ledger is not honoured.
    let raw = CredentialRequest::revoke(vc.id(), &mallory, &default_key(&mallory), &keys).unwrap();
    ledger.submit(&raw.to_json(true).unwrap(), "").unwrap();

    let resolved = backend.resolve_credential(vc.id(), None, true).unwrap().unwrap();
    assert!(!resolved.is_revoked());
    let err = backend
        .resolve_credential(vc.id(), Some(mallory.subject()), true)
        .unwrap_err();
    assert!(matches!(err, DidError::Resolution(_)));
}

#[test]
fn edge_revocation_before_declaration() {
    let (_, backend) = setup();
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    backend.publish_document(&alice, None, &keys).unwrap();
    let id = DidUrl::new(alice.subject(), "future").unwrap();

    backend
        .revoke_credential(&id, &alice, &default_key(&alice), &keys)
        .unwrap();
    assert!(backend.resolve_credential(&id, None, true).unwrap().is_none());
    let bio = backend
        .resolve_credential_biography(&id, None, true)
        .unwrap();
    assert_eq!(bio.status(), CredentialStatus::Revoked);
    assert_eq!(bio.transactions().len(), 1);

    let vc = Issuer::new(alice.clone(), None)
        .unwrap()
        .issue_for(alice.subject())
        .id("#future")
        .seal(&keys)
        .unwrap();
    assert!(matches!(
        backend
            .declare_credential(&vc, &alice, &default_key(&alice), &keys)
            .unwrap_err(),
        DidError::IllegalUsage(_)
    ));
    assert!(matches!(
        backend
            .revoke_credential(&id, &alice, &default_key(&alice), &keys)
            .unwrap_err(),
        DidError::IllegalUsage(_)
    ));
}

#[test]
fn edge_response_for_another_request_is_rejected() {
    let transport = Scripted {
        reply: |_: &Value| json!({ "id": "someone-else", "result": null }),
    };
    let backend = Backend::new(Arc::new(transport));
    let err = backend
        .resolve_did(&Did::new("target").unwrap(), false)
        .unwrap_err();
    assert!(matches!(err, DidError::Resolution(_)));
    assert!(err.is_retryable());
}

#[test]
fn edge_ledger_error_body_is_surfaced() {
    let transport = Scripted {
        reply: |request: &Value| {
            json!({
                "id": request["id"],
                "error": { "code": -32603, "message": "ledger unavailable" }
            })
        },
    };
    let backend = Backend::new(Arc::new(transport));
    match backend
        .resolve_did(&Did::new("target").unwrap(), false)
        .unwrap_err()
    {
        DidError::Ledger { code, message } => {
            assert_eq!(code, -32603);
            assert_eq!(message, "ledger unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.cached_entries(), 0);
}

#[test]
fn edge_biography_about_another_did_is_rejected() {
    let transport = Scripted {
        reply: |request: &Value| {
            json!({
                "id": request["id"],
                "result": { "did": "did:elastos:impostor", "status": 3 }
            })
        },
    };
    let backend = Backend::new(Arc::new(transport));
    let err = backend
        .resolve_did(&Did::new("target").unwrap(), false)
        .unwrap_err();
    assert!(matches!(err, DidError::Resolution(_)));
}

#[test]
fn edge_transport_failures_are_not_cached() {
    let ledger = Arc::new(InMemoryLedger::new());
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    Backend::new(ledger.clone())
        .publish_document(&alice, None, &keys)
        .unwrap();

    let flaky = Flaky {
        inner: ledger.clone(),
        failures: AtomicUsize::new(2),
    };
    let backend = Backend::new(Arc::new(flaky));
    for _ in 0..2 {
        let err = backend.resolve_did(alice.subject(), false).unwrap_err();
        assert!(matches!(err, DidError::Transport(_)));
        assert!(err.is_retryable());
    }
    assert_eq!(backend.resolve_did(alice.subject(), false).unwrap(), Some(alice));
}

#[test]
fn edge_local_resolver_shadows_ledger() {
    let (ledger, mut backend) = setup();
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    backend.publish_document(&alice, None, &keys).unwrap();

    let mut builder = DocumentBuilder::edit(&alice);
    builder
        .add_service("#draft", "Hub", "https://draft.example", None)
        .unwrap();
    let draft = builder.seal(&keys).unwrap();
    let local = draft.clone();
    backend.set_local_resolver(move |did| (did == local.subject()).then(|| local.clone()));

    let before = ledger.resolve_calls();
    assert_eq!(backend.resolve_did(alice.subject(), false).unwrap(), Some(draft));
    assert_eq!(ledger.resolve_calls(), before);

    backend.clear_local_resolver();
    assert_eq!(backend.resolve_did(alice.subject(), true).unwrap(), Some(alice));
}

/// Publish a customized DID controlled by `owner` and return its
/// resolved document.
fn publish_customized(
    backend: &Backend,
    name: &str,
    owner: &Document,
    keys: &KeyRing,
) -> Document {
    let doc = DocumentBuilder::customized(Did::new(name).unwrap(), owner)
        .unwrap()
        .seal(keys)
        .unwrap();
    backend
        .publish_document(&doc, Some(&default_key(owner)), keys)
        .unwrap();
    backend.resolve_did(doc.subject(), true).unwrap().unwrap()
}

#[test]
fn edge_transfer_with_forged_ticket_fails_resolution() {
    let (ledger, backend) = setup();
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    let mallory = new_identity(&mut keys);
    backend.publish_document(&alice, None, &keys).unwrap();
    backend.publish_document(&mallory, None, &keys).unwrap();
    let acme = publish_customized(&backend, "acme", &alice, &keys);

    // A ticket naming alice's key, but not signed by her.
    let unsigned = TransferTicket::new(&acme, mallory.subject()).unwrap();
    let mut forged: Value = serde_json::from_str(&unsigned.to_json(true).unwrap()).unwrap();
    forged["proof"] = json!([{
        "type": "Ed25519Signature2018",
        "created": "2026-01-01T00:00:00Z",
        "verificationMethod": default_key(&alice).to_string(),
        "signature": "AAAA"
    }]);
    let ticket = TransferTicket::parse(&forged.to_string()).unwrap();
    assert!(ticket.is_qualified(&acme));
    assert!(!ticket.is_valid(&backend).unwrap());

    let taken = DocumentBuilder::customized(acme.subject().clone(), &mallory)
        .unwrap()
        .seal(&keys)
        .unwrap();
    let request =
        DocumentRequest::transfer(&taken, &ticket, &default_key(&mallory), &keys, &backend)
            .unwrap();
    ledger.submit(&request.to_json(true).unwrap(), "").unwrap();

    let err = backend.resolve_did(acme.subject(), true).unwrap_err();
    assert!(matches!(err, DidError::Resolution(_)));
    assert_eq!(err.kind(), ErrorKind::ResolutionFailure);
}

#[test]
fn edge_controller_swap_through_update_fails_resolution() {
    let (ledger, backend) = setup();
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    let mallory = new_identity(&mut keys);
    backend.publish_document(&alice, None, &keys).unwrap();
    backend.publish_document(&mallory, None, &keys).unwrap();
    let acme = publish_customized(&backend, "acme", &alice, &keys);
    let txid = acme.metadata().transaction_id().unwrap().to_string();

    let taken = DocumentBuilder::customized(acme.subject().clone(), &mallory)
        .unwrap()
        .seal(&keys)
        .unwrap();
    let request =
        DocumentRequest::update(&taken, &txid, &default_key(&mallory), &keys, &backend).unwrap();
    ledger.submit(&request.to_json(true).unwrap(), "").unwrap();

    assert!(matches!(
        backend.resolve_did(acme.subject(), true).unwrap_err(),
        DidError::Resolution(_)
    ));
}

#[test]
fn edge_ticket_for_older_version_fails_resolution() {
    let (ledger, backend) = setup();
    let mut keys = KeyRing::new();
    let alice = new_identity(&mut keys);
    let carol = new_identity(&mut keys);
    backend.publish_document(&alice, None, &keys).unwrap();
    backend.publish_document(&carol, None, &keys).unwrap();
    let acme = publish_customized(&backend, "acme", &alice, &keys);

    let mut ticket = TransferTicket::new(&acme, carol.subject()).unwrap();
    ticket.seal(&acme, &alice, &keys).unwrap();
    assert!(ticket.is_valid(&backend).unwrap());

    // Alice moves on before the ticket is used.
    let mut builder = DocumentBuilder::edit_as(&acme, &alice).unwrap();
    builder
        .add_service("#shop", "Shop", "https://acme.example", None)
        .unwrap();
    backend
        .publish_document(&builder.seal(&keys).unwrap(), Some(&default_key(&alice)), &keys)
        .unwrap();
    assert!(!ticket.is_valid(&backend).unwrap());

    let moved = DocumentBuilder::customized(acme.subject().clone(), &carol)
        .unwrap()
        .seal(&keys)
        .unwrap();
    let request =
        DocumentRequest::transfer(&moved, &ticket, &default_key(&carol), &keys, &backend).unwrap();
    ledger.submit(&request.to_json(true).unwrap(), "").unwrap();

    assert!(matches!(
        backend.resolve_did(acme.subject(), true).unwrap_err(),
        DidError::Resolution(_)
    ));
}
