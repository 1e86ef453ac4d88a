use crate::domain::attribute::{AttributeMatch, SourceAttributes, TargetAttribute};

/// Derives the source↔target link index from resolved catalog records.
///
/// A record whose `description` names a retail label yields one
/// (source index, target index) pair. The relation is a scan artifact, not
/// an enforced constraint: one retail attribute may end up linked from
/// several catalog rows and no deduplication is applied.
pub fn link_matches(source: &SourceAttributes, targets: &[TargetAttribute]) -> Vec<AttributeMatch> {
    let mut matches = Vec::new();
    for (target, record) in targets.iter().enumerate() {
        if record.description.is_empty() {
            continue;
        }
        if let Some(index) = source.index_of(&record.description) {
            matches.push(AttributeMatch {
                source: index,
                target,
            });
        }
    }
    matches
}
