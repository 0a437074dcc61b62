//! Efficiency pass over raw edit scripts.
//!
//! A minimal script can still be expensive to replay: every INSERT/DELETE
//! applied to a live buffer costs an undo entry, a redraw, and potential
//! selection churn, regardless of payload size. When two edits are
//! separated by only a few equal characters, it is cheaper to re-type those
//! characters than to keep them as a separate EQUAL run, so this pass folds
//! short sandwiched EQUAL runs into the surrounding edits. The transform
//! trades edit minimality for fewer discrete operations; the reconstructed
//! target text never changes.

use crate::diff::{EditScript, Op, OpKind};

/// EQUAL runs shorter than this (in characters) are absorbed when they sit
/// between two edits. Matches the per-operation overhead assumed by the
/// replay stage; not exposed as configuration.
const SMALL_EQUAL_RUN: usize = 4;

/// Reduce the operation count of `script` by absorbing insignificant EQUAL
/// runs into their neighboring edits.
///
/// Pure and idempotent: `cleanup(&cleanup(s)) == cleanup(s)`. The result
/// never has more operations than the input, and reconstructs the same
/// source and target texts.
pub fn cleanup(script: &EditScript) -> EditScript {
    let mut current = script.clone();
    // Each absorbing pass strictly reduces the op count, so this terminates.
    loop {
        let next = absorb_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// One left-to-right pass: replace each short EQUAL run that is sandwiched
/// between two edits with a DELETE/INSERT pair of the same text, then let
/// coalescing fold the pair into the neighboring edits.
fn absorb_pass(script: &EditScript) -> EditScript {
    let ops = script.ops();
    let mut out: Vec<Op> = Vec::with_capacity(ops.len());

    for (i, op) in ops.iter().enumerate() {
        let absorbable = op.kind == OpKind::Equal
            && op.text.chars().count() < SMALL_EQUAL_RUN
            && i > 0
            && ops[i - 1].is_edit()
            && ops.get(i + 1).is_some_and(Op::is_edit);

        if absorbable {
            // The equal text is now removed with the left edit and
            // re-inserted with the right one.
            out.push(Op::delete(op.text.clone()));
            out.push(Op::insert(op.text.clone()));
        } else {
            out.push(op.clone());
        }
    }

    EditScript::from_ops(out)
}
