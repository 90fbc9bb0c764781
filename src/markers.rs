//! Literal marker predicates.
//!
//! The engine only looks at generated text through these functions. Matching is a
//! case-sensitive substring search, which is a heuristic: a response that happens to
//! mention a marker mid-sentence counts. Replacing it with a structured signal means
//! changing this module only.

/// Signalled by the architect when the design is final.
pub const CONSENSUS: &str = "CONSENSUS";
/// Signalled by the coder when the design is acceptable.
pub const AGREED: &str = "AGREED";
/// Audit verdict: constraints satisfied.
pub const PASS: &str = "PASS";
/// Audit verdict: at least one constraint violated.
pub const FAIL: &str = "FAIL";

/// Consensus for a finished dialogue: the architect said `CONSENSUS` in at least one
/// of its turns and the coder said `AGREED` in at least one of its turns.
pub fn dialogue_consensus<A, C>(architect_turns: &[A], coder_turns: &[C]) -> bool
where
    A: AsRef<str>,
    C: AsRef<str>,
{
    architect_turns.iter().any(|t| t.as_ref().contains(CONSENSUS))
        && coder_turns.iter().any(|t| t.as_ref().contains(AGREED))
}

/// Audit verdict of an audit artifact: passed only with a `PASS` marker and no `FAIL` marker.
pub fn audit_passed(text: &str) -> bool {
    text.contains(PASS) && !text.contains(FAIL)
}
