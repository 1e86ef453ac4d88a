use std::sync::LazyLock;

use regex::Regex;

use crate::processing::MatchError;
use crate::processing::reconcile::{constraint_gaps, first_integer, minimal_feasible};

/// KTRU sub-entries carry their distinguishing attribute in the display
/// name, e.g. "Ноутбук (Объём оперативной памяти:≥ 8)".
static SUB_ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((.*):(.*)\)").unwrap());

/// One specific sub-entry under an umbrella catalog listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubEntry {
    /// The distinguishing value extracted from the display name.
    pub key: String,
    pub href: String,
    pub name: String,
}

/// Splits raw `(href, display name)` pairs into the shared category name and
/// the keyed sub-entries.
///
/// The category is taken from the first entry that carries the
/// `(<category>:<value>)` marker; entries without the marker are skipped.
/// Returns `None` when no entry carries the marker at all.
pub fn extract_sub_entries(raw: &[(String, String)]) -> Option<(String, Vec<SubEntry>)> {
    let mut category: Option<String> = None;
    let mut entries = Vec::new();

    for (href, name) in raw {
        let Some(captures) = SUB_ENTRY_RE.captures(name) else {
            log::warn!("Sub-entry without a (category:value) marker skipped: {name}");
            continue;
        };
        if category.is_none() {
            category = Some(captures[1].to_string());
        }
        entries.push(SubEntry {
            key: captures[2].to_string(),
            href: href.clone(),
            name: name.clone(),
        });
    }

    category.map(|category| (category, entries))
}

/// Picks the sub-entry corresponding to `category_value`.
///
/// Exact key match first, then the numeric-threshold rule. Unlike row
/// reconciliation, an entirely infeasible set still force-selects the
/// sub-entry with the smallest |reference − threshold|: a catalog reference
/// has to be chosen to proceed, there is no skipping at this stage. With no
/// exact hit and no numeric reading the choice is handed to a human via
/// [`MatchError::AmbiguousCategory`].
pub fn disambiguate<'a>(
    category: &str,
    category_value: &str,
    entries: &'a [SubEntry],
) -> Result<&'a SubEntry, MatchError> {
    let wanted = category_value.to_lowercase();
    if let Some(entry) = entries.iter().find(|entry| entry.key.to_lowercase() == wanted) {
        return Ok(entry);
    }

    if let Some(reference) = first_integer(category_value) {
        let keys: Vec<String> = entries.iter().map(|entry| entry.key.clone()).collect();
        if let Some(gaps) = constraint_gaps(&keys, reference)
            && !gaps.is_empty()
        {
            if let Some(index) = minimal_feasible(&gaps) {
                return Ok(&entries[index]);
            }
            // Nothing feasible: force the globally closest threshold.
            let mut best: Option<(usize, f64)> = None;
            for entry in &gaps {
                if best.is_none_or(|(_, slack)| entry.slack < slack) {
                    best = Some((entry.index, entry.slack));
                }
            }
            if let Some((index, _)) = best {
                return Ok(&entries[index]);
            }
        }
    }

    Err(MatchError::AmbiguousCategory(category.to_string()))
}
