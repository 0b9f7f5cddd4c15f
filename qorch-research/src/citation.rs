//! Citation analysis over a markdown report: which numbered references
//! (`[N]`) actually got cited, which didn't, and which citation numbers
//! don't correspond to any reference at all.
//!
//! Runs over any markdown deliverable, not just deep-research reports —
//! the specification calls this out explicitly, so this module takes a
//! plain `&str` report and `&[SourceRef]` reference list rather than a
//! `ResearchTask`.

use std::collections::HashMap;
use std::sync::OnceLock;

use qorch_core::model::SourceRef;
use regex::Regex;

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("static regex is valid"))
}

/// A reference list entry paired with its 1-based citation id (the
/// convention the report's `[N]` markers and the reference list's
/// ordering both follow).
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub id: u32,
    pub source: SourceRef,
}

#[derive(Debug, Clone, Default)]
pub struct CitationStats {
    pub total_citations: u32,
    pub unique_citations: usize,
    pub avg_citations_per_source: f32,
    pub most_cited: Vec<(Reference, u32)>,
}

#[derive(Debug, Clone, Default)]
pub struct CitationAnalysis {
    pub cited_refs: Vec<(Reference, u32)>,
    pub uncited_refs: Vec<Reference>,
    pub invalid_citations: Vec<u32>,
    pub stats: CitationStats,
}

/// Extracts every `[N]` occurrence from `report`, counts them per id, and
/// classifies `references` (assigned 1-based ids by list order) into
/// cited/uncited/invalid per the specification's citation-analysis
/// contract. `cited_refs ∪ uncited_refs == references` as sets and the two
/// never overlap — the property asserted in `tests::` below.
#[must_use]
pub fn analyze_citations(report: &str, references: &[SourceRef]) -> CitationAnalysis {
    let mut citation_count: HashMap<u32, u32> = HashMap::new();
    for cap in citation_re().captures_iter(report) {
        if let Ok(id) = cap[1].parse::<u32>() {
            *citation_count.entry(id).or_insert(0) += 1;
        }
    }

    let valid_ids: std::collections::HashSet<u32> = (1..=references.len() as u32).collect();
    let invalid_citations: Vec<u32> = {
        let mut ids: Vec<u32> = citation_count
            .keys()
            .copied()
            .filter(|id| !valid_ids.contains(id))
            .collect();
        ids.sort_unstable();
        ids
    };

    let mut cited_refs: Vec<(Reference, u32)> = Vec::new();
    let mut uncited_refs: Vec<Reference> = Vec::new();
    for (idx, source) in references.iter().enumerate() {
        let id = (idx + 1) as u32;
        let reference = Reference {
            id,
            source: source.clone(),
        };
        match citation_count.get(&id) {
            Some(&count) if count > 0 => cited_refs.push((reference, count)),
            _ => uncited_refs.push(reference),
        }
    }
    cited_refs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.id.cmp(&b.0.id)));

    // Property 5 counts every `[N]` occurrence in the report, valid
    // reference or not — `invalid_citations` calls out the ones with no
    // matching reference, it doesn't exclude them from the total.
    let total_citations: u32 = citation_count.values().sum();
    let unique_citations = cited_refs.len();
    let avg_citations_per_source = if unique_citations == 0 {
        0.0
    } else {
        total_citations as f32 / unique_citations as f32
    };

    let mut most_cited = cited_refs.clone();
    most_cited.truncate(5);

    CitationAnalysis {
        cited_refs,
        uncited_refs,
        invalid_citations,
        stats: CitationStats {
            total_citations,
            unique_citations,
            avg_citations_per_source,
            most_cited,
        },
    }
}

/// Renders the three citation sections the specification names, in order:
/// cited references (by descending count), uncited (related but unused)
/// sources, and a basic statistics table.
#[must_use]
pub fn format_citation_report(analysis: &CitationAnalysis) -> String {
    let mut out = String::new();

    out.push_str("## Cited References\n\n");
    if analysis.cited_refs.is_empty() {
        out.push_str("_No references were cited._\n\n");
    } else {
        for (reference, count) in &analysis.cited_refs {
            out.push_str(&format!(
                "- [{}] {} (cited {count}x)\n",
                reference.id,
                format_source(&reference.source)
            ));
        }
        out.push('\n');
    }

    out.push_str("## Related Sources (Not Cited)\n\n");
    if analysis.uncited_refs.is_empty() {
        out.push_str("_Every retrieved source was cited._\n\n");
    } else {
        for reference in &analysis.uncited_refs {
            out.push_str(&format!("- [{}] {}\n", reference.id, format_source(&reference.source)));
        }
        out.push('\n');
    }

    out.push_str("## Citation Statistics\n\n");
    out.push_str(&format!("- Total citations: {}\n", analysis.stats.total_citations));
    out.push_str(&format!("- Unique sources cited: {}\n", analysis.stats.unique_citations));
    out.push_str(&format!(
        "- Average citations per source: {:.2}\n",
        analysis.stats.avg_citations_per_source
    ));
    if !analysis.invalid_citations.is_empty() {
        out.push_str(&format!(
            "- Invalid citation markers (no matching reference): {}\n",
            analysis
                .invalid_citations
                .iter()
                .map(|id| format!("[{id}]"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    out.push('\n');

    out.push_str("| Reference | Citations |\n|---|---|\n");
    for (reference, count) in &analysis.stats.most_cited {
        out.push_str(&format!("| [{}] {} | {count} |\n", reference.id, format_source(&reference.source)));
    }

    out
}

fn format_source(source: &SourceRef) -> String {
    match &source.page_label {
        Some(page) => format!("{} (p. {page})", source.file_name),
        None => source.file_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn refs(n: usize) -> Vec<SourceRef> {
        (0..n)
            .map(|i| SourceRef {
                file_name: format!("doc{i}.pdf"),
                page_label: Some((i + 1).to_string()),
            })
            .collect()
    }

    #[test]
    fn classifies_cited_uncited_and_invalid() {
        let references = refs(3);
        let report = "Per [1] and again [1], plus [3]. Also see [9] which doesn't exist.";
        let analysis = analyze_citations(report, &references);

        assert_eq!(analysis.cited_refs.len(), 2);
        assert_eq!(analysis.cited_refs[0].0.id, 1);
        assert_eq!(analysis.cited_refs[0].1, 2);
        assert_eq!(analysis.uncited_refs.len(), 1);
        assert_eq!(analysis.uncited_refs[0].id, 2);
        assert_eq!(analysis.invalid_citations, vec![9]);
        // [1] twice, [3] once, [9] once: every `[N]` marker counts toward
        // the total, including the one with no matching reference.
        assert_eq!(analysis.stats.total_citations, 4);
    }

    #[test]
    fn no_citations_leaves_everything_uncited() {
        let references = refs(2);
        let analysis = analyze_citations("a report with no markers at all", &references);
        assert!(analysis.cited_refs.is_empty());
        assert_eq!(analysis.uncited_refs.len(), 2);
        assert!(analysis.invalid_citations.is_empty());
    }

    #[test]
    fn format_report_includes_all_three_sections() {
        let references = refs(2);
        let analysis = analyze_citations("see [1]", &references);
        let formatted = format_citation_report(&analysis);
        assert!(formatted.contains("## Cited References"));
        assert!(formatted.contains("## Related Sources (Not Cited)"));
        assert!(formatted.contains("## Citation Statistics"));
    }

    proptest! {
        /// Universal invariant 5: cited_refs ∪ uncited_refs == references
        /// as sets, the two never overlap, `stats.total_citations` sums
        /// every `[N]` occurrence in the report regardless of whether it
        /// names a real reference, and the per-reference counts folded
        /// into `cited_refs` sum to the occurrences of ids that do.
        #[test]
        fn citation_partition_covers_every_reference(n in 0usize..12, citation_ids in prop::collection::vec(0u32..15, 0..20)) {
            let references = refs(n);
            let report: String = citation_ids.iter().map(|id| format!("[{id}] ")).collect();
            let analysis = analyze_citations(&report, &references);

            let cited_ids: std::collections::HashSet<u32> = analysis.cited_refs.iter().map(|(r, _)| r.id).collect();
            let uncited_ids: std::collections::HashSet<u32> = analysis.uncited_refs.iter().map(|r| r.id).collect();
            prop_assert!(cited_ids.is_disjoint(&uncited_ids));

            let all_ids: std::collections::HashSet<u32> = cited_ids.union(&uncited_ids).copied().collect();
            let expected_ids: std::collections::HashSet<u32> = (1..=n as u32).collect();
            prop_assert_eq!(all_ids, expected_ids);

            // The literal property: total_citations counts every `[N]`
            // occurrence in the report, valid or not.
            prop_assert_eq!(analysis.stats.total_citations, citation_ids.len() as u32);

            let occurrences_for_valid_ids: u32 = citation_ids.iter().filter(|id| **id >= 1 && **id as usize <= n).count() as u32;
            let summed: u32 = analysis.cited_refs.iter().map(|(_, count)| *count).sum();
            prop_assert_eq!(summed, occurrences_for_valid_ids);
        }
    }
}
