//! Requests that create, update, transfer or deactivate a DID.

use serde::{Deserialize, Deserializer, Serialize};

use super::{
    check_header_field, sign_request, signer_of, signing_inputs, DocumentOperation,
    RequestHeader, RequestProof, DOCUMENT_SPECIFICATION,
};
use crate::codec;
use crate::crypto::{signing, KeyProvider};
use crate::did::{Did, DidUrl};
use crate::document::{Document, DocumentResolver};
use crate::error::{DidError, Result};
use crate::ticket::TransferTicket;

/// A signed DID operation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRequest {
    header: RequestHeader<DocumentOperation>,
    payload: String,
    proof: RequestProof,
    #[serde(skip)]
    subject: Did,
    #[serde(skip)]
    document: Option<Document>,
    #[serde(skip)]
    ticket: Option<TransferTicket>,
}

#[derive(Deserialize)]
struct DocumentRequestData {
    header: RequestHeader<DocumentOperation>,
    payload: String,
    proof: RequestProof,
}

impl TryFrom<DocumentRequestData> for DocumentRequest {
    type Error = DidError;

    fn try_from(data: DocumentRequestData) -> Result<Self> {
        let DocumentRequestData {
            header,
            payload,
            mut proof,
        } = data;
        if header.specification != DOCUMENT_SPECIFICATION {
            return Err(DidError::MalformedRequest(format!(
                "unsupported specification {}",
                header.specification
            )));
        }
        let op = header.operation;
        check_header_field(
            "previousTxid",
            header.previous_txid.as_deref(),
            op == DocumentOperation::Update,
            op.as_str(),
        )?;
        check_header_field(
            "ticket",
            header.ticket.as_deref(),
            op == DocumentOperation::Transfer,
            op.as_str(),
        )?;

        let (subject, document) = match op {
            DocumentOperation::Deactivate => {
                let subject: Did = payload.parse().map_err(|e| {
                    DidError::MalformedRequest(format!("deactivate payload: {e}"))
                })?;
                (subject, None)
            }
            _ => {
                let document: Document = codec::from_base64(&payload)
                    .map_err(|e| DidError::MalformedRequest(format!("{op} payload: {e}")))?;
                (document.subject().clone(), Some(document))
            }
        };

        let ticket = match header.ticket.as_deref() {
            Some(encoded) => {
                let ticket: TransferTicket = codec::from_base64(encoded)
                    .map_err(|e| DidError::MalformedRequest(format!("ticket: {e}")))?;
                if ticket.subject() != &subject {
                    return Err(DidError::MalformedRequest(format!(
                        "ticket is for {}, request is for {subject}",
                        ticket.subject()
                    )));
                }
                Some(ticket)
            }
            None => None,
        };

        proof.verification_method.qualify(&subject);
        if proof.signature.is_empty() {
            return Err(DidError::MalformedRequest("empty signature".into()));
        }

        Ok(Self {
            header,
            payload,
            proof,
            subject,
            document,
            ticket,
        })
    }
}

impl<'de> Deserialize<'de> for DocumentRequest {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let data = DocumentRequestData::deserialize(d)?;
        DocumentRequest::try_from(data).map_err(serde::de::Error::custom)
    }
}

/// A request is signed by an authentication key of the document or, for
/// a customized document, by an authentication key of one of its
/// controllers' own documents.
fn check_sign_key(
    document: &Document,
    sign_key: &DidUrl,
    resolver: &dyn DocumentResolver,
) -> Result<()> {
    if document.is_authentication_key(sign_key) {
        return Ok(());
    }
    let signer = signer_of(sign_key).map_err(|e| DidError::InvalidKey(e.to_string()))?;
    if document.is_customized() && document.has_controller(signer) {
        let controller = resolver
            .resolve_document(signer)?
            .ok_or_else(|| DidError::NotFound(signer.to_string()))?;
        if controller.is_authentication_key(sign_key) {
            return Ok(());
        }
    }
    Err(DidError::InvalidKey(format!(
        "{sign_key} cannot sign for {}",
        document.subject()
    )))
}

fn check_qualified(document: &Document) -> Result<()> {
    if !document.is_qualified() {
        return Err(DidError::DocumentNotValid(format!(
            "{} carries {} of {} proofs",
            document.subject(),
            document.proofs().len(),
            document.quorum()
        )));
    }
    Ok(())
}

impl DocumentRequest {
    #[allow(clippy::too_many_arguments)]
    fn seal(
        operation: DocumentOperation,
        subject: Did,
        document: Option<Document>,
        previous_txid: Option<String>,
        ticket: Option<TransferTicket>,
        verification_method: DidUrl,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<Self> {
        let payload = match &document {
            Some(doc) => codec::to_base64(doc)?,
            None => subject.to_string(),
        };
        let encoded_ticket = ticket.as_ref().map(codec::to_base64).transpose()?;
        let header = RequestHeader {
            specification: DOCUMENT_SPECIFICATION.to_string(),
            operation,
            previous_txid,
            ticket: encoded_ticket,
        };
        let inputs = signing_inputs(
            &header.specification,
            operation.as_str(),
            header.previous_txid.as_deref(),
            header.ticket.as_deref(),
            &payload,
        );
        let signature = sign_request(keys, sign_key, &inputs)?;
        Ok(Self {
            header,
            payload,
            proof: RequestProof {
                proof_type: None,
                created: None,
                verification_method,
                signature,
            },
            subject,
            document,
            ticket,
        })
    }

    /// Publish a new DID.
    ///
    /// `resolver` supplies controller documents when a customized
    /// document is signed by one of its controllers.
    pub fn create(
        document: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
        resolver: &dyn DocumentResolver,
    ) -> Result<Self> {
        check_qualified(document)?;
        check_sign_key(document, sign_key, resolver)?;
        Self::seal(
            DocumentOperation::Create,
            document.subject().clone(),
            Some(document.clone()),
            None,
            None,
            sign_key.clone(),
            sign_key,
            keys,
        )
    }

    /// Publish a new version on top of `previous_txid`.
    pub fn update(
        document: &Document,
        previous_txid: &str,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
        resolver: &dyn DocumentResolver,
    ) -> Result<Self> {
        check_qualified(document)?;
        check_sign_key(document, sign_key, resolver)?;
        if previous_txid.is_empty() {
            return Err(DidError::IllegalUsage("update requires a previous txid".into()));
        }
        Self::seal(
            DocumentOperation::Update,
            document.subject().clone(),
            Some(document.clone()),
            Some(previous_txid.to_string()),
            None,
            sign_key.clone(),
            sign_key,
            keys,
        )
    }

    /// Publish the new version of a transferred customized DID.
    pub fn transfer(
        document: &Document,
        ticket: &TransferTicket,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
        resolver: &dyn DocumentResolver,
    ) -> Result<Self> {
        check_qualified(document)?;
        check_sign_key(document, sign_key, resolver)?;
        if ticket.subject() != document.subject() {
            return Err(DidError::IllegalUsage(format!(
                "ticket is for {}, not {}",
                ticket.subject(),
                document.subject()
            )));
        }
        Self::seal(
            DocumentOperation::Transfer,
            document.subject().clone(),
            Some(document.clone()),
            None,
            Some(ticket.clone()),
            sign_key.clone(),
            sign_key,
            keys,
        )
    }

    /// Deactivate a DID with its own key or a controller's key.
    pub fn deactivate(
        document: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
        resolver: &dyn DocumentResolver,
    ) -> Result<Self> {
        check_sign_key(document, sign_key, resolver)?;
        Self::seal(
            DocumentOperation::Deactivate,
            document.subject().clone(),
            None,
            None,
            None,
            sign_key.clone(),
            sign_key,
            keys,
        )
    }

    /// Deactivate `target` through an authorization key it granted to
    /// `signer`.
    pub fn deactivate_by(
        target: &Document,
        signer: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<Self> {
        if !signer.is_authentication_key(sign_key) {
            return Err(DidError::InvalidKey(format!(
                "{sign_key} is not an authentication key of {}",
                signer.subject()
            )));
        }
        let key = signer
            .public_key(sign_key)
            .ok_or_else(|| DidError::InvalidKey(sign_key.to_string()))?;
        let authorization = target
            .authorization_keys()
            .find(|k| {
                k.controller() == signer.subject()
                    && k.public_key_base58() == key.public_key_base58()
            })
            .ok_or_else(|| {
                DidError::InvalidKey(format!(
                    "{} is not authorized to deactivate {}",
                    signer.subject(),
                    target.subject()
                ))
            })?;
        Self::seal(
            DocumentOperation::Deactivate,
            target.subject().clone(),
            None,
            None,
            None,
            authorization.id().clone(),
            sign_key,
            keys,
        )
    }

    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DidError::MalformedRequest(e.to_string()))
    }

    pub fn to_json(&self, normalized: bool) -> Result<String> {
        codec::encode(self, normalized)
    }

    pub fn header(&self) -> &RequestHeader<DocumentOperation> {
        &self.header
    }

    pub fn operation(&self) -> DocumentOperation {
        self.header.operation
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn proof(&self) -> &RequestProof {
        &self.proof
    }

    /// The DID the request acts on.
    pub fn subject(&self) -> &Did {
        &self.subject
    }

    /// The embedded document, absent for deactivation.
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn ticket(&self) -> Option<&TransferTicket> {
        self.ticket.as_ref()
    }

    fn verify_signature(&self, public_key: &str) -> bool {
        let inputs = signing_inputs(
            &self.header.specification,
            self.header.operation.as_str(),
            self.header.previous_txid.as_deref(),
            self.header.ticket.as_deref(),
            &self.payload,
        );
        signing::verify(public_key, &self.proof.signature, &inputs)
    }

    /// Public key of the signer, if the signer may perform this operation.
    fn signer_key(
        &self,
        document: &Document,
        resolver: &dyn DocumentResolver,
    ) -> Result<Option<String>> {
        let method = &self.proof.verification_method;
        if method.belongs_to(document.subject()) {
            let allowed = document.is_authentication_key(method)
                || (self.operation() == DocumentOperation::Deactivate
                    && document.is_authorization_key(method));
            return Ok(document
                .public_key(method)
                .filter(|_| allowed)
                .map(|k| k.public_key_base58().to_string()));
        }
        let Some(signer) = method.did() else {
            return Ok(None);
        };
        if !document.is_customized() || !document.has_controller(signer) {
            return Ok(None);
        }
        let Some(controller) = resolver.resolve_document(signer)? else {
            return Ok(None);
        };
        Ok(controller
            .public_key(method)
            .filter(|_| controller.is_authentication_key(method))
            .map(|k| k.public_key_base58().to_string()))
    }

    /// The acted-on document is valid and the proof was produced by a
    /// key allowed to perform the operation.
    ///
    /// Deactivation carries no document, so the subject is resolved.
    pub fn is_valid(&self, resolver: &dyn DocumentResolver) -> Result<bool> {
        let resolved;
        let document = match &self.document {
            Some(document) => document,
            None => {
                resolved = match resolver.resolve_document(&self.subject)? {
                    Some(document) => document,
                    None => return Ok(false),
                };
                &resolved
            }
        };
        if !document.is_valid(resolver)? {
            return Ok(false);
        }
        if self.operation() == DocumentOperation::Transfer {
            let Some(ticket) = &self.ticket else {
                return Ok(false);
            };
            let Some(signer) = self.proof.verification_method.did() else {
                return Ok(false);
            };
            if signer != ticket.to() || !document.has_controller(ticket.to()) {
                return Ok(false);
            }
        }
        Ok(match self.signer_key(document, resolver)? {
            Some(public_key) => self.verify_signature(&public_key),
            None => false,
        })
    }
}
