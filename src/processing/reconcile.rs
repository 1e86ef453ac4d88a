use std::sync::LazyLock;

use regex::Regex;

use crate::domain::attribute::SourceAttributes;

static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static LATIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("[a-z]").unwrap());
static CYRILLIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("[а-я]").unwrap());

/// Yes/no tokens that look like free text but are enumerated flags; they
/// must not trigger the literal-match strategy.
const BOOLEAN_TOKENS: [&str; 3] = ["да", "нет", "есть"];

const INEQUALITY_SIGNS: [&str; 4] = ["≤", "≥", "<", ">"];

/// First integer substring of `text` as a reference magnitude.
///
/// Only the integer digits are captured, so "2.5 кг" yields 2.
pub(crate) fn first_integer(text: &str) -> Option<f64> {
    INTEGER_RE.find(text).and_then(|m| m.as_str().parse().ok())
}

/// A `sign number` candidate measured against a reference magnitude.
pub(crate) struct ConstraintGap {
    pub index: usize,
    /// threshold − reference for ≤/<, reference − threshold for ≥/>;
    /// +∞ when the inequality does not hold.
    pub gap: f64,
    /// |reference − threshold|, used when a choice must be forced anyway.
    pub slack: f64,
}

/// Measures every `sign number` candidate against `reference`.
///
/// Candidates that do not start with an inequality sign are left out of the
/// result. A candidate that starts with a sign but is not exactly
/// `sign number` returns `None`, which abandons the whole row.
pub(crate) fn constraint_gaps(values: &[String], reference: f64) -> Option<Vec<ConstraintGap>> {
    let mut gaps = Vec::new();
    for (index, value) in values.iter().enumerate() {
        let tokens: Vec<&str> = value.trim().split_whitespace().collect();
        let Some(sign) = tokens.first() else {
            continue;
        };
        if !INEQUALITY_SIGNS.contains(sign) {
            continue;
        }
        if tokens.len() != 2 {
            return None;
        }
        let threshold: f64 = tokens[1].parse().ok()?;

        let gap = match *sign {
            "≤" if reference <= threshold => threshold - reference,
            "<" if reference < threshold => threshold - reference,
            "≥" if reference >= threshold => reference - threshold,
            ">" if reference > threshold => reference - threshold,
            _ => f64::INFINITY,
        };

        gaps.push(ConstraintGap {
            index,
            gap,
            slack: (reference - threshold).abs(),
        });
    }
    Some(gaps)
}

/// Index of the minimal finite gap; ties keep the earliest candidate.
pub(crate) fn minimal_feasible(gaps: &[ConstraintGap]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for entry in gaps {
        if entry.gap.is_finite() && best.is_none_or(|(_, gap)| entry.gap < gap) {
            best = Some((entry.index, entry.gap));
        }
    }
    best.map(|(index, _)| index)
}

/// Decides which candidate value corresponds to `source_value`, if any.
///
/// Strategies are tried strictly in order, first success wins:
/// 1. case-insensitive exact match;
/// 2. cross-vocabulary literal match, when the first candidate reads as free
///    text (has a Latin letter, or a Cyrillic letter outside the yes/no
///    tokens): the first candidate equal to any retail value wins;
/// 3. numeric-threshold match over `sign number` candidates, minimizing the
///    gap between the reference magnitude and the threshold; an entirely
///    infeasible set selects nothing.
///
/// Pure decision only; activating the selected value is the caller's step.
pub fn reconcile(
    candidates: &[String],
    source_value: &str,
    source: &SourceAttributes,
) -> Option<usize> {
    let wanted = source_value.to_lowercase();

    if let Some(index) = candidates
        .iter()
        .position(|value| value.to_lowercase() == wanted)
    {
        return Some(index);
    }

    let first = candidates.first()?.to_lowercase();
    if LATIN_RE.is_match(&first)
        || (CYRILLIC_RE.is_match(&first) && !BOOLEAN_TOKENS.contains(&first.as_str()))
    {
        for (index, candidate) in candidates.iter().enumerate() {
            let candidate = candidate.to_lowercase();
            for (_, value) in source.iter() {
                if value.to_lowercase() == candidate {
                    return Some(index);
                }
            }
        }
        return None;
    }

    let reference = first_integer(&wanted)?;
    let gaps = constraint_gaps(candidates, reference)?;
    minimal_feasible(&gaps)
}
