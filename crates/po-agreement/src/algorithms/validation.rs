//! # Contract Validation
//!
//! The purchase-order contract expressed as a tree of rules and evaluated by
//! a single interpreter.
//!
//! ```text
//! AllOf
//! ├── Timestamped
//! └── GroupByLinearId
//!     └── AnyOf
//!         └── Place
//! ```
//!
//! A leaf rule *matches* when every command it requires is present; a
//! matched leaf either claims those commands or fails with its reasons.
//! `AllOf` needs every child to match, `AnyOf` at least one. After the tree
//! has run, any command no rule claimed is rejected as unhandled.
//!
//! Evaluation only reads the transaction (including its attached window),
//! so the same transaction always yields the same verdict.

use crate::domain::{
    invariant_delivery_region, invariant_distinct_parties, invariant_future_delivery,
    invariant_items, invariant_participants_sign, invariant_timestamped, invariant_total_quantity,
    legal_contract_reference, reasons, CommandKind, LedgerTransaction, PublicKey,
    PurchaseOrderState, UniqueIdentifier, ValidationFailure,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// A node of the contract rule tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    /// Structural: a validity window is attached.
    Timestamped,
    /// Issuance of a purchase order.
    Place,
    /// Every child must match and pass.
    AllOf(Vec<Rule>),
    /// At least one child must match; matched children must pass.
    AnyOf(Vec<Rule>),
    /// Evaluate the inner rule once per linear-id group.
    GroupByLinearId(Box<Rule>),
}

impl Rule {
    /// Name used in failure reports.
    pub fn name(&self) -> &'static str {
        match self {
            Rule::Timestamped => "Timestamped",
            Rule::Place => "Place",
            Rule::AllOf(_) => "AllOf",
            Rule::AnyOf(_) => "AnyOf",
            Rule::GroupByLinearId(_) => "GroupByLinearId",
        }
    }

    fn required_commands(&self) -> &'static [CommandKind] {
        match self {
            Rule::Place => &[CommandKind::Place],
            _ => &[],
        }
    }
}

/// Inputs and outputs sharing one linear id.
#[derive(Debug, Default)]
struct Group<'a> {
    inputs: Vec<&'a PurchaseOrderState>,
    outputs: Vec<&'a PurchaseOrderState>,
}

/// Result of a rule that did not fail.
enum Outcome {
    NotMatched,
    Claimed(BTreeSet<CommandKind>),
}

/// Evaluation context shared by the whole tree walk.
struct Ctx<'a> {
    tx: &'a LedgerTransaction,
    present: BTreeSet<CommandKind>,
}

impl<'a> Ctx<'a> {
    fn new(tx: &'a LedgerTransaction) -> Self {
        Self {
            tx,
            present: tx.commands.iter().map(|c| c.kind).collect(),
        }
    }

    fn signers_for(&self, kind: CommandKind) -> Vec<PublicKey> {
        self.tx
            .commands
            .iter()
            .filter(|c| c.kind == kind)
            .flat_map(|c| c.signers.iter().copied())
            .collect()
    }

    fn whole_tx(&self) -> Group<'a> {
        let tx = self.tx;
        Group {
            inputs: tx.inputs.iter().collect(),
            outputs: tx.outputs.iter().collect(),
        }
    }

    fn groups(&self) -> BTreeMap<&'a UniqueIdentifier, Group<'a>> {
        let tx = self.tx;
        let mut groups: BTreeMap<&'a UniqueIdentifier, Group<'a>> = BTreeMap::new();
        for state in &tx.inputs {
            groups.entry(&state.linear_id).or_default().inputs.push(state);
        }
        for state in &tx.outputs {
            groups.entry(&state.linear_id).or_default().outputs.push(state);
        }
        groups
    }
}

fn eval(rule: &Rule, ctx: &Ctx<'_>, group: &Group<'_>) -> Result<Outcome, ValidationFailure> {
    match rule {
        Rule::Timestamped | Rule::Place => {
            let required = rule.required_commands();
            if !required.iter().all(|kind| ctx.present.contains(kind)) {
                return Ok(Outcome::NotMatched);
            }
            let failed = match rule {
                Rule::Timestamped => check_timestamped(ctx),
                _ => check_place(ctx, group),
            };
            if !failed.is_empty() {
                return Err(ValidationFailure {
                    clause: rule.name().to_string(),
                    reasons: failed,
                });
            }
            Ok(Outcome::Claimed(required.iter().copied().collect()))
        }
        Rule::AllOf(children) => {
            let mut claimed = BTreeSet::new();
            for child in children {
                match eval(child, ctx, group)? {
                    Outcome::Claimed(kinds) => claimed.extend(kinds),
                    Outcome::NotMatched => {
                        return Err(ValidationFailure::single(
                            rule.name(),
                            format!("required clause {} did not match", child.name()),
                        ))
                    }
                }
            }
            Ok(Outcome::Claimed(claimed))
        }
        Rule::AnyOf(children) => {
            let mut claimed = BTreeSet::new();
            let mut matched = false;
            for child in children {
                if let Outcome::Claimed(kinds) = eval(child, ctx, group)? {
                    matched = true;
                    claimed.extend(kinds);
                }
            }
            if matched {
                Ok(Outcome::Claimed(claimed))
            } else {
                Ok(Outcome::NotMatched)
            }
        }
        Rule::GroupByLinearId(inner) => {
            let groups = ctx.groups();
            if groups.is_empty() {
                return Ok(Outcome::NotMatched);
            }
            let mut claimed = BTreeSet::new();
            for (linear_id, group) in &groups {
                trace!(%linear_id, "[po] evaluating group");
                match eval(inner, ctx, group)? {
                    Outcome::Claimed(kinds) => claimed.extend(kinds),
                    Outcome::NotMatched => return Ok(Outcome::NotMatched),
                }
            }
            Ok(Outcome::Claimed(claimed))
        }
    }
}

fn check_timestamped(ctx: &Ctx<'_>) -> Vec<String> {
    match invariant_timestamped(ctx.tx.time_window.as_ref()) {
        Ok(()) => Vec::new(),
        Err(reason) => vec![reason.to_string()],
    }
}

fn check_place(ctx: &Ctx<'_>, group: &Group<'_>) -> Vec<String> {
    let mut failed: Vec<&'static str> = Vec::new();

    if !group.inputs.is_empty() {
        failed.push(reasons::NO_INPUTS);
    }
    if group.outputs.len() != 1 {
        failed.push(reasons::ONE_OUTPUT);
    }

    if let Some(out) = group.outputs.first() {
        let signers = ctx.signers_for(CommandKind::Place);
        failed.extend(invariant_distinct_parties(out).err());
        failed.extend(invariant_participants_sign(out, &signers).err());
        failed.extend(invariant_delivery_region(&out.po).err());
        failed.extend(invariant_items(&out.po));
        failed.extend(invariant_total_quantity(&out.po).err());
        match ctx.tx.time_window.as_ref() {
            Some(window) => {
                failed.extend(invariant_future_delivery(out.po.delivery_date, window).err())
            }
            None => failed.push(reasons::MUST_BE_TIMESTAMPED),
        }
    }

    failed.into_iter().map(str::to_string).collect()
}

/// The purchase-order contract: a rule tree plus the legal reference.
#[derive(Clone, Debug)]
pub struct PurchaseOrderContract {
    rule: Rule,
}

impl Default for PurchaseOrderContract {
    fn default() -> Self {
        Self {
            rule: Rule::AllOf(vec![
                Rule::Timestamped,
                Rule::GroupByLinearId(Box::new(Rule::AnyOf(vec![Rule::Place]))),
            ]),
        }
    }
}

impl PurchaseOrderContract {
    /// Contract with a custom rule tree.
    pub fn with_rule(rule: Rule) -> Self {
        Self { rule }
    }

    /// Rule tree in force.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// SHA-256 of the legal template.
    pub fn legal_contract_reference(&self) -> [u8; 32] {
        legal_contract_reference()
    }

    /// Verify `tx` against the rule tree.
    pub fn verify(&self, tx: &LedgerTransaction) -> Result<(), ValidationFailure> {
        let ctx = Ctx::new(tx);
        let whole = ctx.whole_tx();

        let claimed = match eval(&self.rule, &ctx, &whole)? {
            Outcome::Claimed(kinds) => kinds,
            Outcome::NotMatched => BTreeSet::new(),
        };

        let unhandled: Vec<String> = ctx
            .present
            .iter()
            .filter(|kind| !claimed.contains(kind))
            .map(|kind| format!("{}: {}", reasons::UNHANDLED_COMMAND, kind.name()))
            .collect();
        if !unhandled.is_empty() {
            return Err(ValidationFailure {
                clause: "Contract".to_string(),
                reasons: unhandled,
            });
        }
        if claimed.is_empty() {
            return Err(ValidationFailure::single(
                "Contract",
                "transaction carries no purchase-order command",
            ));
        }
        Ok(())
    }
}
