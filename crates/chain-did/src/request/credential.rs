//! Requests that declare or revoke a credential on the ledger.

use serde::{Deserialize, Deserializer, Serialize};

use super::{
    check_header_field, sign_request, signer_of, signing_inputs, CredentialOperation,
    RequestHeader, RequestProof, CREDENTIAL_SPECIFICATION,
};
use crate::codec;
use crate::credential::VerifiableCredential;
use crate::crypto::{signing, KeyProvider};
use crate::did::{Did, DidUrl};
use crate::document::{Document, DocumentResolver};
use crate::error::{DidError, Result};

/// A signed credential operation.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialRequest {
    header: RequestHeader<CredentialOperation>,
    payload: String,
    proof: RequestProof,
    #[serde(skip)]
    id: DidUrl,
    #[serde(skip)]
    credential: Option<VerifiableCredential>,
}

#[derive(Deserialize)]
struct CredentialRequestData {
    header: RequestHeader<CredentialOperation>,
    payload: String,
    proof: RequestProof,
}

impl TryFrom<CredentialRequestData> for CredentialRequest {
    type Error = DidError;

    fn try_from(data: CredentialRequestData) -> Result<Self> {
        let CredentialRequestData {
            header,
            payload,
            mut proof,
        } = data;
        if header.specification != CREDENTIAL_SPECIFICATION {
            return Err(DidError::MalformedRequest(format!(
                "unsupported specification {}",
                header.specification
            )));
        }
        let op = header.operation;
        check_header_field("previousTxid", header.previous_txid.as_deref(), false, op.as_str())?;
        check_header_field("ticket", header.ticket.as_deref(), false, op.as_str())?;

        let (id, credential) = match op {
            CredentialOperation::Declare => {
                let vc: VerifiableCredential = codec::from_base64(&payload)
                    .map_err(|e| DidError::MalformedRequest(format!("declare payload: {e}")))?;
                (vc.id().clone(), Some(vc))
            }
            CredentialOperation::Revoke => {
                let id: DidUrl = payload
                    .parse()
                    .map_err(|e| DidError::MalformedRequest(format!("revoke payload: {e}")))?;
                if !id.is_qualified() {
                    return Err(DidError::MalformedRequest(format!(
                        "revoke payload {id} is not qualified"
                    )));
                }
                (id, None)
            }
        };

        let owner = signer_of(&id)?.clone();
        proof.verification_method.qualify(&owner);
        if proof.signature.is_empty() {
            return Err(DidError::MalformedRequest("empty signature".into()));
        }

        Ok(Self {
            header,
            payload,
            proof,
            id,
            credential,
        })
    }
}

impl<'de> Deserialize<'de> for CredentialRequest {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let data = CredentialRequestData::deserialize(d)?;
        CredentialRequest::try_from(data).map_err(serde::de::Error::custom)
    }
}

fn check_sign_key(signer: &Document, sign_key: &DidUrl) -> Result<()> {
    if !signer.is_authentication_key(sign_key) {
        return Err(DidError::InvalidKey(format!(
            "{sign_key} is not an authentication key of {}",
            signer.subject()
        )));
    }
    Ok(())
}

impl CredentialRequest {
    fn seal(
        operation: CredentialOperation,
        id: DidUrl,
        credential: Option<VerifiableCredential>,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<Self> {
        let payload = match &credential {
            Some(vc) => codec::to_base64(vc)?,
            None => id.to_string(),
        };
        let header = RequestHeader {
            specification: CREDENTIAL_SPECIFICATION.to_string(),
            operation,
            previous_txid: None,
            ticket: None,
        };
        let inputs = signing_inputs(
            &header.specification,
            operation.as_str(),
            None,
            None,
            &payload,
        );
        let signature = sign_request(keys, sign_key, &inputs)?;
        Ok(Self {
            header,
            payload,
            proof: RequestProof {
                proof_type: None,
                created: None,
                verification_method: sign_key.clone(),
                signature,
            },
            id,
            credential,
        })
    }

    /// Declare a credential; only its owner may do so.
    pub fn declare(
        credential: &VerifiableCredential,
        signer: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<Self> {
        if signer.subject() != credential.subject().id() {
            return Err(DidError::IllegalUsage(format!(
                "only {} may declare {}",
                credential.subject().id(),
                credential.id()
            )));
        }
        check_sign_key(signer, sign_key)?;
        Self::seal(
            CredentialOperation::Declare,
            credential.id().clone(),
            Some(credential.clone()),
            sign_key,
            keys,
        )
    }

    /// Revoke a credential id as its owner or issuer.
    pub fn revoke(
        id: &DidUrl,
        signer: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<Self> {
        if !id.is_qualified() {
            return Err(DidError::IllegalUsage(format!("{id} is not qualified")));
        }
        check_sign_key(signer, sign_key)?;
        Self::seal(CredentialOperation::Revoke, id.clone(), None, sign_key, keys)
    }

    /// Revoke a known credential, checking the signer is its owner or issuer.
    pub fn revoke_credential(
        credential: &VerifiableCredential,
        signer: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<Self> {
        let did = signer.subject();
        if did != credential.subject().id() && did != credential.issuer() {
            return Err(DidError::IllegalUsage(format!(
                "{did} neither owns nor issued {}",
                credential.id()
            )));
        }
        Self::revoke(credential.id(), signer, sign_key, keys)
    }

    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DidError::MalformedRequest(e.to_string()))
    }

    pub fn to_json(&self, normalized: bool) -> Result<String> {
        codec::encode(self, normalized)
    }

    pub fn header(&self) -> &RequestHeader<CredentialOperation> {
        &self.header
    }

    pub fn operation(&self) -> CredentialOperation {
        self.header.operation
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn proof(&self) -> &RequestProof {
        &self.proof
    }

    /// Id of the credential acted on.
    pub fn id(&self) -> &DidUrl {
        &self.id
    }

    /// The declared credential, absent for revocation.
    pub fn credential(&self) -> Option<&VerifiableCredential> {
        self.credential.as_ref()
    }

    /// The DID whose key signed the request.
    pub fn signer(&self) -> Option<&Did> {
        self.proof.verification_method.did()
    }

    pub fn is_valid(&self, resolver: &dyn DocumentResolver) -> Result<bool> {
        self.is_valid_with(resolver, None)
    }

    /// Validate, using `declared` as the revoked credential when the
    /// request itself carries none.
    pub fn is_valid_with(
        &self,
        resolver: &dyn DocumentResolver,
        declared: Option<&VerifiableCredential>,
    ) -> Result<bool> {
        let method = &self.proof.verification_method;
        let Some(signer) = method.did() else {
            return Ok(false);
        };

        match self.operation() {
            CredentialOperation::Declare => {
                let Some(vc) = &self.credential else {
                    return Ok(false);
                };
                if signer != vc.subject().id() || vc.is_expired() || !vc.is_genuine(resolver)? {
                    return Ok(false);
                }
            }
            CredentialOperation::Revoke => {
                if let Some(vc) = declared.or(self.credential.as_ref()) {
                    if vc.id() != &self.id || (signer != vc.subject().id() && signer != vc.issuer())
                    {
                        return Ok(false);
                    }
                }
            }
        }

        let Some(signer_doc) = resolver.resolve_document(signer)? else {
            return Ok(false);
        };
        if !signer_doc.is_valid(resolver)? || !signer_doc.is_authentication_key(method) {
            return Ok(false);
        }
        let Some(key) = signer_doc.public_key(method) else {
            return Ok(false);
        };
        let inputs = signing_inputs(
            &self.header.specification,
            self.header.operation.as_str(),
            None,
            None,
            &self.payload,
        );
        Ok(signing::verify(
            key.public_key_base58(),
            &self.proof.signature,
            &inputs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Issuer;
    use crate::crypto::KeyRing;
    use crate::testutil::{primitive_document, MapResolver};

    fn issued(keys: &mut KeyRing) -> (Document, Document, VerifiableCredential) {
        let issuer = primitive_document(keys);
        let owner = primitive_document(keys);
        let vc = Issuer::new(issuer.clone(), None)
            .unwrap()
            .issue_for(owner.subject())
            .id("#passport")
            .property("nationality", "Atlantis")
            .seal(keys)
            .unwrap();
        (issuer, owner, vc)
    }

    #[test]
    fn test_declare_by_owner() {
        let mut keys = KeyRing::new();
        let (issuer, owner, vc) = issued(&mut keys);
        let resolver = MapResolver::from_documents([&issuer, &owner]);
        let sign_key = owner.default_key().unwrap().id().clone();

        let request = CredentialRequest::declare(&vc, &owner, &sign_key, &keys).unwrap();
        let parsed = CredentialRequest::parse(&request.to_json(true).unwrap()).unwrap();
        assert_eq!(parsed.id(), vc.id());
        assert_eq!(parsed.credential(), Some(&vc));
        assert!(parsed.is_valid(&resolver).unwrap());

        let issuer_key = issuer.default_key().unwrap().id().clone();
        assert!(CredentialRequest::declare(&vc, &issuer, &issuer_key, &keys).is_err());
    }

    #[test]
    fn test_revoke_by_issuer_or_owner_only() {
        let mut keys = KeyRing::new();
        let (issuer, owner, vc) = issued(&mut keys);
        let stranger = primitive_document(&mut keys);
        let resolver = MapResolver::from_documents([&issuer, &owner, &stranger]);

        let issuer_key = issuer.default_key().unwrap().id().clone();
        let by_issuer = CredentialRequest::revoke(vc.id(), &issuer, &issuer_key, &keys).unwrap();
        assert!(by_issuer.is_valid_with(&resolver, Some(&vc)).unwrap());

        let stranger_key = stranger.default_key().unwrap().id().clone();
        let by_stranger =
            CredentialRequest::revoke(vc.id(), &stranger, &stranger_key, &keys).unwrap();
        assert!(by_stranger.is_valid(&resolver).unwrap());
        assert!(!by_stranger.is_valid_with(&resolver, Some(&vc)).unwrap());

        assert!(CredentialRequest::revoke_credential(&vc, &stranger, &stranger_key, &keys).is_err());
    }

    #[test]
    fn test_revoke_payload_must_be_qualified() {
        let mut keys = KeyRing::new();
        let (issuer, _, vc) = issued(&mut keys);
        let issuer_key = issuer.default_key().unwrap().id().clone();
        let request = CredentialRequest::revoke(vc.id(), &issuer, &issuer_key, &keys).unwrap();
        let mut json: serde_json::Value =
            serde_json::from_str(&request.to_json(true).unwrap()).unwrap();
        json["payload"] = serde_json::Value::from("#passport");
        assert!(serde_json::from_value::<CredentialRequest>(json).is_err());
    }
}
