//! Transfer tickets: controller consent to hand a customized DID to a
//! new owner.
//!
//! A ticket is bound to the transaction id of the document version it
//! transfers, so it cannot be replayed against a later version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::codec;
use crate::crypto::{signing, KeyProvider};
use crate::did::{Did, DidUrl};
use crate::document::{Document, DocumentResolver, DEFAULT_PROOF_TYPE};
use crate::error::{DidError, Result};
use crate::time;

/// One controller's signature over a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketProof {
    #[serde(rename = "type")]
    proof_type: String,
    #[serde(with = "time::seconds")]
    created: DateTime<Utc>,
    #[serde(rename = "verificationMethod")]
    verification_method: DidUrl,
    signature: String,
}

impl TicketProof {
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn verification_method(&self) -> &DidUrl {
        &self.verification_method
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// Consent from the controllers of `id` to transfer it to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferTicket {
    id: Did,
    to: Did,
    txid: String,
    #[serde(rename = "proof")]
    proofs: Vec<TicketProof>,
}

#[derive(Deserialize)]
struct TicketData {
    id: Did,
    to: Did,
    txid: String,
    #[serde(rename = "proof", default)]
    proofs: Vec<TicketProof>,
}

impl TryFrom<TicketData> for TransferTicket {
    type Error = DidError;

    fn try_from(data: TicketData) -> Result<Self> {
        let malformed = |msg: String| DidError::MalformedTicket(msg);
        if data.txid.is_empty() {
            return Err(malformed(format!("{}: missing txid", data.id)));
        }
        if data.proofs.is_empty() {
            return Err(malformed(format!("{}: missing proof", data.id)));
        }
        let mut signers = Vec::new();
        for proof in &data.proofs {
            let signer = proof
                .verification_method
                .did()
                .ok_or_else(|| malformed(format!("{}: unqualified proof key", data.id)))?;
            if signers.contains(&signer) {
                return Err(malformed(format!("{}: duplicate proof from {signer}", data.id)));
            }
            signers.push(signer);
        }
        Ok(Self {
            id: data.id,
            to: data.to,
            txid: data.txid,
            proofs: data.proofs,
        })
    }
}

impl<'de> Deserialize<'de> for TransferTicket {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let data = TicketData::deserialize(d)?;
        TransferTicket::try_from(data).map_err(serde::de::Error::custom)
    }
}

impl TransferTicket {
    /// Start a ticket for the published version of `target`.
    pub fn new(target: &Document, to: &Did) -> Result<Self> {
        if !target.is_customized() {
            return Err(DidError::NotCustomized(target.subject().to_string()));
        }
        if target.subject() == to {
            return Err(DidError::IllegalUsage(format!(
                "cannot transfer {to} to itself"
            )));
        }
        let txid = target.metadata().transaction_id().ok_or_else(|| {
            DidError::IllegalUsage(format!("{} is not published", target.subject()))
        })?;
        Ok(Self {
            id: target.subject().clone(),
            to: to.clone(),
            txid: txid.to_string(),
            proofs: Vec::new(),
        })
    }

    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DidError::MalformedTicket(e.to_string()))
    }

    pub fn to_json(&self, normalized: bool) -> Result<String> {
        codec::encode(self, normalized)
    }

    /// The DID being transferred.
    pub fn subject(&self) -> &Did {
        &self.id
    }

    pub fn to(&self) -> &Did {
        &self.to
    }

    pub fn transaction_id(&self) -> &str {
        &self.txid
    }

    pub fn proofs(&self) -> &[TicketProof] {
        &self.proofs
    }

    fn signing_bytes(&self) -> Result<Vec<u8>> {
        codec::canonical_bytes_without(self, "proof")
    }

    /// Whether the ticket carries the quorum of `target`.
    pub fn is_qualified(&self, target: &Document) -> bool {
        self.proofs.len() == target.quorum()
    }

    /// Add `controller`'s signature with its default key.
    pub fn seal(
        &mut self,
        target: &Document,
        controller: &Document,
        keys: &dyn KeyProvider,
    ) -> Result<()> {
        if target.subject() != &self.id {
            return Err(DidError::IllegalUsage(format!(
                "ticket is for {}, not {}",
                self.id,
                target.subject()
            )));
        }
        if self.is_qualified(target) {
            return Err(DidError::AlreadySealed);
        }
        let signer = controller.subject();
        if !target.has_controller(signer) {
            return Err(DidError::NotController(signer.to_string()));
        }
        if self
            .proofs
            .iter()
            .any(|p| p.verification_method.belongs_to(signer))
        {
            return Err(DidError::AlreadySigned(signer.to_string()));
        }
        let key = controller
            .default_key()
            .ok_or_else(|| DidError::InvalidKey(format!("{signer} has no default key")))?;

        let signing_key = keys.signing_key(key.id())?;
        let signature = signing::sign(&signing_key, &[&self.signing_bytes()?]);
        self.proofs.push(TicketProof {
            proof_type: DEFAULT_PROOF_TYPE.to_string(),
            created: time::now(),
            verification_method: key.id().clone(),
            signature,
        });
        self.proofs.sort_by(|a, b| {
            a.created
                .cmp(&b.created)
                .then_with(|| a.verification_method.cmp(&b.verification_method))
        });
        Ok(())
    }

    /// Quorum met and every proof verifies against a distinct controller.
    pub fn is_genuine(&self, resolver: &dyn DocumentResolver) -> Result<bool> {
        let Some(target) = resolver.resolve_document(&self.id)? else {
            return Ok(false);
        };
        self.is_genuine_for(&target, resolver)
    }

    /// Like [`is_genuine`](Self::is_genuine), against a given version of
    /// the target document.
    pub(crate) fn is_genuine_for(
        &self,
        target: &Document,
        resolver: &dyn DocumentResolver,
    ) -> Result<bool> {
        if !target.is_genuine(resolver)? || !self.is_qualified(target) {
            return Ok(false);
        }
        let digest = self.signing_bytes()?;
        let mut seen = Vec::new();
        for proof in &self.proofs {
            let Some(signer) = proof.verification_method.did() else {
                return Ok(false);
            };
            if !target.has_controller(signer) || seen.contains(&signer) {
                return Ok(false);
            }
            seen.push(signer);
            let Some(controller) = resolver.resolve_document(signer)? else {
                return Ok(false);
            };
            let is_default_key = controller
                .default_key()
                .is_some_and(|k| k.id() == &proof.verification_method);
            if !is_default_key
                || !controller.verify(&proof.verification_method, &proof.signature, &[&digest])
                || !controller.is_valid(resolver)?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Genuine and bound to the target's current transaction.
    pub fn is_valid(&self, resolver: &dyn DocumentResolver) -> Result<bool> {
        let Some(target) = resolver.resolve_document(&self.id)? else {
            return Ok(false);
        };
        if target.is_deactivated() || target.is_expired() {
            return Ok(false);
        }
        if target.metadata().transaction_id() != Some(self.txid.as_str()) {
            log::debug!("ticket for {} is bound to a stale transaction", self.id);
            return Ok(false);
        }
        self.is_genuine_for(&target, resolver)
    }
}
