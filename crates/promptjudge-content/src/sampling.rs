//! Stratified sampling of oversized collections.

use std::collections::BTreeMap;

use crate::source::RemoteEntry;
use crate::ContentKind;

/// Pick at most `cap` entries so every detected kind keeps its share of the
/// collection. Quotas use largest remainders; within a kind the smallest
/// entries win, ties broken by path. The result is sorted by path.
pub fn stratified_sample(entries: Vec<RemoteEntry>, cap: usize) -> Vec<RemoteEntry> {
    let total = entries.len();
    if total <= cap {
        return entries;
    }
    if cap == 0 {
        return Vec::new();
    }

    let mut groups: BTreeMap<ContentKind, Vec<RemoteEntry>> = BTreeMap::new();
    for entry in entries {
        groups
            .entry(ContentKind::detect(&entry.path))
            .or_default()
            .push(entry);
    }

    // (kind, floor quota, remainder numerator)
    let mut quotas: Vec<(ContentKind, usize, usize)> = groups
        .iter()
        .map(|(kind, group)| {
            let exact = cap * group.len();
            (*kind, exact / total, exact % total)
        })
        .collect();

    let assigned: usize = quotas.iter().map(|(_, q, _)| q).sum();
    let mut by_remainder: Vec<usize> = (0..quotas.len()).collect();
    by_remainder.sort_by(|&a, &b| quotas[b].2.cmp(&quotas[a].2).then(a.cmp(&b)));
    for &i in by_remainder.iter().take(cap - assigned) {
        quotas[i].1 += 1;
    }

    let mut sample = Vec::with_capacity(cap);
    for (kind, quota, _) in quotas {
        if let Some(mut group) = groups.remove(&kind) {
            group.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path)));
            sample.extend(group.into_iter().take(quota));
        }
    }
    sample.sort_by(|a, b| a.path.cmp(&b.path));
    sample
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64) -> RemoteEntry {
        RemoteEntry {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            size,
            is_collection: false,
        }
    }

    fn count(sample: &[RemoteEntry], kind: ContentKind) -> usize {
        sample
            .iter()
            .filter(|e| ContentKind::detect(&e.path) == kind)
            .count()
    }

    #[test]
    fn test_under_cap_is_untouched() {
        let entries = vec![entry("a.rs", 1), entry("b.md", 2)];
        assert_eq!(stratified_sample(entries.clone(), 5), entries);
    }

    #[test]
    fn test_proportional_across_kinds() {
        let mut entries = Vec::new();
        for i in 0..60 {
            entries.push(entry(&format!("src/f{:02}.rs", i), 100 + i));
        }
        for i in 0..30 {
            entries.push(entry(&format!("docs/d{:02}.md", i), 100 + i));
        }
        for i in 0..10 {
            entries.push(entry(&format!("cfg/c{:02}.json", i), 100 + i));
        }

        let sample = stratified_sample(entries, 10);
        assert_eq!(sample.len(), 10);
        assert_eq!(count(&sample, ContentKind::Code), 6);
        assert_eq!(count(&sample, ContentKind::Text), 3);
        assert_eq!(count(&sample, ContentKind::Config), 1);
    }

    #[test]
    fn test_largest_remainder_fills_cap() {
        // 1/3 each, cap 4: floors are 1,1,1 and one extra seat goes to the
        // first kind in order
        let entries = vec![
            entry("a.rs", 1),
            entry("b.rs", 1),
            entry("c.md", 1),
            entry("d.md", 1),
            entry("e.json", 1),
            entry("f.json", 1),
        ];
        let sample = stratified_sample(entries, 4);
        assert_eq!(sample.len(), 4);
        assert!(count(&sample, ContentKind::Text) >= 1);
        assert!(count(&sample, ContentKind::Code) >= 1);
        assert!(count(&sample, ContentKind::Config) >= 1);
    }

    #[test]
    fn test_smallest_first_within_kind() {
        let entries = vec![
            entry("big.rs", 1_000),
            entry("small.rs", 10),
            entry("medium.rs", 100),
        ];
        let sample = stratified_sample(entries, 2);
        let paths: Vec<_> = sample.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["medium.rs", "small.rs"]);
    }
}
