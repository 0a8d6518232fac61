//! # Transactions
//!
//! The proposal exchanged between the parties and the three stages of a
//! transaction: unsigned, partially signed, finalized.
//!
//! ```text
//! ProposedAgreement ──derive──► UnsignedTransaction
//!                                      │ id() = SHA-256(content)
//!                                      ▼
//!                     PartiallySignedTransaction  (signer key → signature)
//!                                      │ + notary signature
//!                                      ▼
//!                          FinalizedTransaction   (all signers present)
//! ```
//!
//! A [`FinalizedTransaction`] can only be obtained through
//! [`FinalizedTransaction::finalize`], which checks that the signer set is
//! exactly the required signers plus the notary. Deserialization goes through
//! the same check.

use super::entities::{Party, PurchaseOrderState};
use super::errors::AssemblyError;
use super::invariants::{legal_contract_reference, CONTRACT_NAME};
use super::value_objects::{DigitalSignature, PublicKey, StateRef, TimeWindow, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Command types understood by the purchase-order contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Issue a new purchase order.
    Place,
}

impl CommandKind {
    /// Stable name, also hashed into the transaction id.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Place => "Place",
        }
    }
}

/// A command plus the keys that must sign for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// What the transaction does.
    pub kind: CommandKind,
    /// Keys required to sign.
    pub signers: Vec<PublicKey>,
}

/// Offer sent by the proposer. Untrusted on the receiving side until
/// structurally checked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAgreement {
    /// Proposed output state.
    pub state: PurchaseOrderState,
    /// Party sending the offer.
    pub proposer: Party,
    /// Party asked to countersign.
    pub counterparty: Party,
    /// Keys that must sign the resulting transaction.
    pub required_signers: Vec<PublicKey>,
    /// Notary chosen by the proposer.
    pub notary: Party,
}

/// Transaction content before any signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Consumed states.
    pub inputs: Vec<StateRef>,
    /// Created states.
    pub outputs: Vec<PurchaseOrderState>,
    /// Commands with their signers.
    pub commands: Vec<Command>,
    /// Notary responsible for uniqueness.
    pub notary: Party,
    /// Validity window.
    pub time_window: Option<TimeWindow>,
}

impl UnsignedTransaction {
    /// Content-derived identifier.
    ///
    /// Every field is hashed in a fixed order with length prefixes, so two
    /// parties holding equal transactions always compute the same id.
    pub fn id(&self) -> TransactionId {
        let mut hasher = Sha256::new();
        hasher.update(b"po-agreement/tx/v1");
        hash_str(&mut hasher, CONTRACT_NAME);
        hasher.update(legal_contract_reference());

        hash_len(&mut hasher, self.inputs.len());
        for input in &self.inputs {
            hasher.update(input.txhash.as_bytes());
            hasher.update(input.index.to_le_bytes());
        }

        hash_len(&mut hasher, self.outputs.len());
        for output in &self.outputs {
            hash_state(&mut hasher, output);
        }

        hash_len(&mut hasher, self.commands.len());
        for command in &self.commands {
            hash_str(&mut hasher, command.kind.name());
            hash_len(&mut hasher, command.signers.len());
            for signer in &command.signers {
                hasher.update(signer.as_bytes());
            }
        }

        hash_party(&mut hasher, &self.notary);

        match &self.time_window {
            Some(window) => {
                hasher.update([1u8]);
                hash_instant(&mut hasher, window.not_before);
                hash_instant(&mut hasher, window.not_after);
            }
            None => hasher.update([0u8]),
        }

        TransactionId(hasher.finalize().into())
    }

    /// Union of command signers and output participants.
    pub fn required_signers(&self) -> BTreeSet<PublicKey> {
        self.commands
            .iter()
            .flat_map(|c| c.signers.iter().copied())
            .chain(self.outputs.iter().flat_map(|o| o.participants()))
            .collect()
    }

    /// Keys allowed to sign: required signers plus the notary.
    pub fn allowed_signers(&self) -> BTreeSet<PublicKey> {
        let mut keys = self.required_signers();
        keys.insert(self.notary.owning_key);
        keys
    }
}

fn hash_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hash_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

fn hash_instant(hasher: &mut Sha256, instant: DateTime<Utc>) {
    hasher.update(instant.timestamp().to_le_bytes());
    hasher.update(instant.timestamp_subsec_nanos().to_le_bytes());
}

fn hash_party(hasher: &mut Sha256, party: &Party) {
    hash_str(hasher, &party.name);
    hasher.update(party.owning_key.as_bytes());
}

fn hash_state(hasher: &mut Sha256, state: &PurchaseOrderState) {
    let po = &state.po;
    hasher.update(po.order_number.to_le_bytes());
    hash_instant(hasher, po.delivery_date);
    hash_str(hasher, &po.delivery_address.city);
    hash_str(hasher, &po.delivery_address.country);
    hash_len(hasher, po.items.len());
    for item in &po.items {
        hash_str(hasher, &item.name);
        hasher.update(item.amount.to_le_bytes());
    }
    hash_party(hasher, &state.buyer);
    hash_party(hasher, &state.seller);
    match &state.linear_id.external_id {
        Some(ext) => {
            hasher.update([1u8]);
            hash_str(hasher, ext);
        }
        None => hasher.update([0u8]),
    }
    hasher.update(state.linear_id.id.as_bytes());
}

/// Unsigned transaction plus the signatures collected so far.
///
/// Signatures are keyed by signer; entries are only ever added or replaced
/// by the same signer, never removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartiallySignedTransaction {
    tx: UnsignedTransaction,
    signatures: BTreeMap<PublicKey, DigitalSignature>,
}

impl PartiallySignedTransaction {
    /// Wrap an unsigned transaction with no signatures.
    pub fn new(tx: UnsignedTransaction) -> Self {
        Self {
            tx,
            signatures: BTreeMap::new(),
        }
    }

    /// The signed content.
    pub fn tx(&self) -> &UnsignedTransaction {
        &self.tx
    }

    /// Id of the signed content.
    pub fn id(&self) -> TransactionId {
        self.tx.id()
    }

    /// Collected signatures, ordered by signer key.
    pub fn signatures(&self) -> &BTreeMap<PublicKey, DigitalSignature> {
        &self.signatures
    }

    /// Keys that have signed.
    pub fn signers(&self) -> BTreeSet<PublicKey> {
        self.signatures.keys().copied().collect()
    }

    /// Required signers (notary excluded) whose signature is absent.
    pub fn missing_signers(&self) -> BTreeSet<PublicKey> {
        self.tx
            .required_signers()
            .into_iter()
            .filter(|key| !self.signatures.contains_key(key))
            .collect()
    }

    /// Insert a signature keyed by its signer. Callers check authorization
    /// and validity first.
    pub(crate) fn insert_signature(&mut self, signature: DigitalSignature) {
        self.signatures.insert(signature.by, signature);
    }
}

/// Fully signed and notarised transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFinalized")]
pub struct FinalizedTransaction {
    signed: PartiallySignedTransaction,
    notary_signature: DigitalSignature,
}

#[derive(Deserialize)]
struct RawFinalized {
    signed: PartiallySignedTransaction,
    notary_signature: DigitalSignature,
}

impl TryFrom<RawFinalized> for FinalizedTransaction {
    type Error = AssemblyError;

    fn try_from(raw: RawFinalized) -> Result<Self, Self::Error> {
        FinalizedTransaction::finalize(raw.signed, raw.notary_signature)
    }
}

impl FinalizedTransaction {
    /// Combine a fully signed transaction with the notary's signature.
    ///
    /// Fails unless every required signer has a valid signature, the notary
    /// signature comes from the transaction's notary and verifies, and no
    /// other key has signed.
    pub fn finalize(
        signed: PartiallySignedTransaction,
        notary_signature: DigitalSignature,
    ) -> Result<Self, AssemblyError> {
        let id = signed.id();
        let notary_key = signed.tx.notary.owning_key;

        if notary_signature.by != notary_key {
            return Err(AssemblyError::WrongNotary {
                expected: notary_key,
                got: notary_signature.by,
            });
        }
        crate::crypto::verify(&id, &notary_signature)
            .map_err(|_| AssemblyError::BadSignature(notary_key))?;

        let missing: Vec<PublicKey> = signed.missing_signers().into_iter().collect();
        if !missing.is_empty() {
            return Err(AssemblyError::MissingSignatures(missing));
        }

        let required = signed.tx.required_signers();
        for (key, signature) in &signed.signatures {
            if !required.contains(key) || signature.by != *key {
                return Err(AssemblyError::UnauthorizedSigner(*key));
            }
            crate::crypto::verify(&id, signature).map_err(|_| AssemblyError::BadSignature(*key))?;
        }

        Ok(Self {
            signed,
            notary_signature,
        })
    }

    /// Transaction id.
    pub fn id(&self) -> TransactionId {
        self.signed.id()
    }

    /// The signed content.
    pub fn tx(&self) -> &UnsignedTransaction {
        self.signed.tx()
    }

    /// Participant signatures.
    pub fn participant_signatures(&self) -> &BTreeMap<PublicKey, DigitalSignature> {
        self.signed.signatures()
    }

    /// The notary's signature.
    pub fn notary_signature(&self) -> &DigitalSignature {
        &self.notary_signature
    }

    /// Every signer, notary included.
    pub fn signers(&self) -> BTreeSet<PublicKey> {
        let mut keys = self.signed.signers();
        keys.insert(self.notary_signature.by);
        keys
    }

    /// Number of signatures, notary included.
    pub fn signature_count(&self) -> usize {
        self.signed.signatures.len() + 1
    }

    /// Output states, in order.
    pub fn outputs(&self) -> &[PurchaseOrderState] {
        &self.signed.tx.outputs
    }
}

/// Transaction with its inputs resolved to states; what the contract rules
/// evaluate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerTransaction {
    /// Id of the underlying transaction.
    pub id: TransactionId,
    /// Resolved input states, same order as the declared refs.
    pub inputs: Vec<PurchaseOrderState>,
    /// Output states.
    pub outputs: Vec<PurchaseOrderState>,
    /// Commands.
    pub commands: Vec<Command>,
    /// Notary.
    pub notary: Party,
    /// Validity window.
    pub time_window: Option<TimeWindow>,
}

impl LedgerTransaction {
    /// Pair `tx` with its resolved inputs.
    pub fn new(tx: &UnsignedTransaction, inputs: Vec<PurchaseOrderState>) -> Self {
        Self {
            id: tx.id(),
            inputs,
            outputs: tx.outputs.clone(),
            commands: tx.commands.clone(),
            notary: tx.notary.clone(),
            time_window: tx.time_window,
        }
    }
}
