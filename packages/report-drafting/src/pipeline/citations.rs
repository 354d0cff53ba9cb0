//! Citation marker extraction and resolution.
//!
//! Markers use the syntax `[Evidence: <ref>, <ref>]` where a ref is an
//! evidence tag (`E3`), an exemplar tag (`X1`) or an evidence label
//! (`IMG_045.jpg`), matched case-insensitively. Bare tags such as `[E3]`
//! are accepted and rewritten to the full syntax.
//!
//! Labels may themselves contain commas (`roof, north.jpg`), so a run of
//! refs that together spell a supplied label resolves as that label.
//!
//! Resolution never invents a reference: refs that match nothing supplied
//! in the request are removed from the text and reported.

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::types::{
    draft::{EvidenceReference, GenerationRequest, UnmatchedCitation},
    evidence::SourceType,
};

static RE_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*(?:evidence\s*:\s*([^\]]*?)|([ex]\d+(?:\s*,\s*[ex]\d+)*))\s*\]")
        .expect("citation pattern is valid")
});

static RE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([ex])(\d+)$").expect("tag pattern is valid"));

/// One citation marker found in raw model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMarker {
    /// Byte range of the whole marker
    pub start: usize,
    pub end: usize,

    /// Trimmed, non-empty refs inside the marker
    pub refs: Vec<String>,
}

/// Find every citation marker in `text`, in order.
pub fn find_markers(text: &str) -> Vec<CitationMarker> {
    RE_CITATION
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(CitationMarker {
                start: whole.start(),
                end: whole.end(),
                refs: marker_refs(&caps),
            })
        })
        .collect()
}

fn marker_refs(caps: &Captures<'_>) -> Vec<String> {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| {
            m.as_str()
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// What a single ref points at in the originating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CitationTarget {
    Evidence(usize),
    Exemplar(usize),
}

/// Resolve one ref against the request's evidence and exemplars.
pub fn resolve_ref(reference: &str, request: &GenerationRequest) -> Option<CitationTarget> {
    if let Some(caps) = RE_TAG.captures(reference) {
        let n: usize = caps[2].parse().ok()?;
        let index = n.checked_sub(1)?;
        let is_evidence = caps[1].eq_ignore_ascii_case("e");
        return match is_evidence {
            true if index < request.evidence.len() => Some(CitationTarget::Evidence(index)),
            false if index < request.exemplars.len() => Some(CitationTarget::Exemplar(index)),
            _ => None,
        };
    }

    // First item wins when several share a label (one photo, many findings)
    if let Some(index) = request
        .evidence
        .iter()
        .position(|e| e.label.eq_ignore_ascii_case(reference))
    {
        return Some(CitationTarget::Evidence(index));
    }
    request
        .exemplars
        .iter()
        .position(|x| x.source_label.eq_ignore_ascii_case(reference))
        .map(CitationTarget::Exemplar)
}

/// Resolve the refs of one marker, longest comma-bearing label first.
///
/// Returns each resolved ref text (runs rejoined with `", "`) with its
/// target, or `None` when it matches nothing.
pub fn resolve_marker(
    refs: &[String],
    request: &GenerationRequest,
) -> Vec<(String, Option<CitationTarget>)> {
    let mut resolved = Vec::with_capacity(refs.len());
    let mut i = 0;
    while i < refs.len() {
        let run = (i + 1..refs.len())
            .rev()
            .find_map(|j| resolve_label_parts(&refs[i..=j], request).map(|target| (j, target)));
        match run {
            Some((j, target)) => {
                resolved.push((refs[i..=j].join(", "), Some(target)));
                i = j + 1;
            }
            None => {
                resolved.push((refs[i].clone(), resolve_ref(&refs[i], request)));
                i += 1;
            }
        }
    }
    resolved
}

fn resolve_label_parts(parts: &[String], request: &GenerationRequest) -> Option<CitationTarget> {
    let spells = |label: &str| {
        let pieces: Vec<&str> = label.split(',').map(str::trim).collect();
        pieces.len() == parts.len()
            && pieces
                .iter()
                .zip(parts)
                .all(|(piece, part)| piece.eq_ignore_ascii_case(part))
    };

    if let Some(index) = request.evidence.iter().position(|e| spells(&e.label)) {
        return Some(CitationTarget::Evidence(index));
    }
    request
        .exemplars
        .iter()
        .position(|x| spells(&x.source_label))
        .map(CitationTarget::Exemplar)
}

/// Draft text with markers validated against the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedCitations {
    /// Content with unmatched refs removed and bare tags normalized
    pub content: String,

    /// Distinct cited sources, evidence first, in request order
    pub references: Vec<EvidenceReference>,

    /// Distinct evidence sources supplied but never cited
    pub unused: Vec<EvidenceReference>,

    /// Refs that matched nothing
    pub unmatched: Vec<UnmatchedCitation>,

    /// Number of distinct evidence sources supplied
    pub provided_sources: usize,

    /// Number of distinct evidence sources cited
    pub cited_sources: usize,
}

/// Validate every marker in `raw` against `request`.
pub fn resolve_citations(raw: &str, request: &GenerationRequest) -> ResolvedCitations {
    let mut cited: HashSet<CitationTarget> = HashSet::new();
    let mut unmatched = Vec::new();
    let mut content = String::with_capacity(raw.len());
    let mut last = 0;

    for marker in find_markers(raw) {
        let mut kept = Vec::new();
        for (reference, target) in resolve_marker(&marker.refs, request) {
            match target {
                Some(target) => {
                    cited.insert(target);
                    kept.push(reference);
                }
                None => unmatched.push(UnmatchedCitation { reference }),
            }
        }

        let before = &raw[last..marker.start];
        if kept.is_empty() {
            // drop the marker together with the space that introduced it
            content.push_str(before.strip_suffix(' ').unwrap_or(before));
        } else {
            content.push_str(before);
            content.push_str("[Evidence: ");
            content.push_str(&kept.join(", "));
            content.push(']');
        }
        last = marker.end;
    }
    content.push_str(&raw[last..]);

    let cited_sources: HashSet<(SourceType, &str)> = cited
        .iter()
        .map(|target| match *target {
            CitationTarget::Evidence(i) => {
                let item = &request.evidence[i];
                (item.source_type(), item.source_id.as_str())
            }
            CitationTarget::Exemplar(i) => {
                (SourceType::Exemplar, request.exemplars[i].record_id.as_str())
            }
        })
        .collect();

    let mut references = Vec::new();
    let mut unused = Vec::new();
    let mut seen: HashSet<(SourceType, &str)> = HashSet::new();
    for item in &request.evidence {
        let key = (item.source_type(), item.source_id.as_str());
        if !seen.insert(key) {
            continue;
        }
        let reference = EvidenceReference {
            source_type: item.source_type(),
            source_id: item.source_id.clone(),
            label: item.label.clone(),
        };
        if cited_sources.contains(&key) {
            references.push(reference);
        } else {
            unused.push(reference);
        }
    }
    let provided_sources = seen.len();
    let cited_evidence = references.len();

    for exemplar in &request.exemplars {
        let key = (SourceType::Exemplar, exemplar.record_id.as_str());
        if cited_sources.contains(&key) && seen.insert(key) {
            references.push(EvidenceReference {
                source_type: SourceType::Exemplar,
                source_id: exemplar.record_id.clone(),
                label: exemplar.source_label.clone(),
            });
        }
    }

    ResolvedCitations {
        content,
        references,
        unused,
        unmatched,
        provided_sources,
        cited_sources: cited_evidence,
    }
}
