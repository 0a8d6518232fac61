//! # Transaction Assembly
//!
//! Pure construction steps: proposal → unsigned → partially signed →
//! finalized. Nothing here performs I/O or reads a clock; callers pass the
//! current instant in.

use crate::crypto::{self, Ed25519KeyPair};
use crate::domain::{
    AssemblyError, Command, CommandKind, DigitalSignature, FinalizedTransaction, Party,
    PartiallySignedTransaction, ProposedAgreement, PublicKey, PurchaseOrderState, TimeWindow,
    TransactionId, UnsignedTransaction, ValidationFailure,
};
use chrono::{DateTime, Duration, Utc};

/// Build the proposal the proposer sends.
pub fn build_proposal(
    state: PurchaseOrderState,
    proposer: Party,
    counterparty: Party,
    notary: Party,
) -> ProposedAgreement {
    let required_signers = state.participants();
    ProposedAgreement {
        state,
        proposer,
        counterparty,
        required_signers,
        notary,
    }
}

/// Structural checks on a received proposal.
///
/// `local` is the receiving party, `peer` the party at the other end of
/// the session. Business rules are left to the contract.
pub fn check_proposal(
    proposal: &ProposedAgreement,
    local: &Party,
    peer: &Party,
) -> Result<(), ValidationFailure> {
    let mut reasons = Vec::new();
    if proposal.counterparty != *local {
        reasons.push(format!(
            "Proposal is addressed to {}, not {}",
            proposal.counterparty, local
        ));
    }
    if proposal.proposer != *peer {
        reasons.push(format!(
            "Proposal claims to come from {} but the session peer is {}",
            proposal.proposer, peer
        ));
    }
    if proposal.state.buyer != proposal.proposer {
        reasons.push("The proposer must be the buyer.".to_string());
    }
    if proposal.state.seller != proposal.counterparty {
        reasons.push("The counterparty must be the seller.".to_string());
    }
    if proposal.required_signers != proposal.state.participants() {
        reasons.push("Required signers must be exactly the participants.".to_string());
    }
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure {
            clause: "Proposal".to_string(),
            reasons,
        })
    }
}

/// Check a window chosen by the peer against our own clock.
///
/// The window must have the configured length and start within `skew` of
/// `now`; otherwise its midpoint could be moved to suit the contract.
pub fn check_window(
    window: &TimeWindow,
    now: DateTime<Utc>,
    length: Duration,
    skew: Duration,
) -> Result<(), ValidationFailure> {
    let mut reasons = Vec::new();
    if window.length() != length {
        reasons.push(format!(
            "Time window lasts {}s, expected {}s",
            window.length().num_seconds(),
            length.num_seconds()
        ));
    }
    let offset = window.not_before - now;
    if offset > skew || offset < -skew {
        reasons.push(format!(
            "Time window starts {}s away from the local clock",
            offset.num_seconds()
        ));
    }
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure {
            clause: "Timestamped".to_string(),
            reasons,
        })
    }
}

/// Structural checks on a finalized transaction that arrived without a
/// preceding proposal, as when a proposer re-forwards after a restart.
///
/// Every output must name `peer` as buyer and `local` as seller.
pub fn check_recovered(
    ftx: &FinalizedTransaction,
    local: &Party,
    peer: &Party,
) -> Result<(), ValidationFailure> {
    let tx = ftx.tx();
    let mut reasons = Vec::new();
    if tx.outputs.is_empty() {
        reasons.push("Finalized transaction has no outputs.".to_string());
    }
    for output in &tx.outputs {
        if output.buyer != *peer {
            reasons.push(format!("Buyer {} is not the session peer {}", output.buyer, peer));
        }
        if output.seller != *local {
            reasons.push(format!("Seller {} is not {}", output.seller, local));
        }
    }
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure {
            clause: "Recovery".to_string(),
            reasons,
        })
    }
}

/// Fresh validity window `[now, now + length]`.
pub fn fresh_window(now: DateTime<Utc>, length: Duration) -> TimeWindow {
    TimeWindow::starting_at(now, length)
}

/// Derive the unsigned transaction for `proposal` under `window`.
///
/// Both parties call this with the same arguments and get equal
/// transactions.
pub fn derive_unsigned(proposal: &ProposedAgreement, window: TimeWindow) -> UnsignedTransaction {
    UnsignedTransaction {
        inputs: Vec::new(),
        outputs: vec![proposal.state.clone()],
        commands: vec![Command {
            kind: CommandKind::Place,
            signers: proposal.required_signers.clone(),
        }],
        notary: proposal.notary.clone(),
        time_window: Some(window),
    }
}

/// Build an unsigned transaction with a fresh window starting at `now`.
pub fn build_unsigned(
    proposal: &ProposedAgreement,
    now: DateTime<Utc>,
    window_length: Duration,
) -> UnsignedTransaction {
    derive_unsigned(proposal, fresh_window(now, window_length))
}

/// Content-derived transaction id.
pub fn compute_id(tx: &UnsignedTransaction) -> TransactionId {
    tx.id()
}

/// Add or replace a signature.
///
/// The signer must be a required signer and the signature must verify over
/// the transaction id.
pub fn add_signature(
    stx: &mut PartiallySignedTransaction,
    signature: DigitalSignature,
) -> Result<(), AssemblyError> {
    if !stx.tx().required_signers().contains(&signature.by) {
        return Err(AssemblyError::UnauthorizedSigner(signature.by));
    }
    crypto::verify(&stx.id(), &signature).map_err(|_| AssemblyError::BadSignature(signature.by))?;
    stx.insert_signature(signature);
    Ok(())
}

/// Sign with `keypair` and add the signature.
pub fn sign(
    stx: &mut PartiallySignedTransaction,
    keypair: &Ed25519KeyPair,
) -> Result<(), AssemblyError> {
    let signature = keypair.sign(&stx.id());
    add_signature(stx, signature)
}

/// Check every present signature and that only `allowed_missing` keys are
/// absent among the required signers.
pub fn verify_signatures(
    stx: &PartiallySignedTransaction,
    allowed_missing: &[PublicKey],
) -> Result<(), AssemblyError> {
    let id = stx.id();
    let required = stx.tx().required_signers();

    for (key, signature) in stx.signatures() {
        if !required.contains(key) || signature.by != *key {
            return Err(AssemblyError::UnauthorizedSigner(*key));
        }
        crypto::verify(&id, signature).map_err(|_| AssemblyError::BadSignature(*key))?;
    }

    let missing: Vec<PublicKey> = stx
        .missing_signers()
        .into_iter()
        .filter(|key| !allowed_missing.contains(key))
        .collect();
    if !missing.is_empty() {
        return Err(AssemblyError::MissingSignatures(missing));
    }
    Ok(())
}

/// Check that `received` carries exactly the content `expected` describes.
pub fn ensure_same_transaction(
    expected: &UnsignedTransaction,
    received: &PartiallySignedTransaction,
) -> Result<(), AssemblyError> {
    let expected_id = expected.id();
    let got = received.id();
    if expected_id != got {
        return Err(AssemblyError::TransactionMismatch {
            expected: expected_id,
            got,
        });
    }
    Ok(())
}

/// Combine a fully signed transaction with the notary's signature.
pub fn finalize(
    stx: PartiallySignedTransaction,
    notary_signature: DigitalSignature,
) -> Result<FinalizedTransaction, AssemblyError> {
    FinalizedTransaction::finalize(stx, notary_signature)
}
