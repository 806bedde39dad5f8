//! Two-tier retrieval: query construction, tier merge, and bounded context
//! rendering.
//!
//! Queries carry an optional manufacturer and model number on top of the
//! attribute being asked for. Both tiers ("specific" first, "shared" as
//! fallback evidence) are searched with the same query and filters; specific
//! hits always come first, shared hits are labelled but never dropped.

use crate::{
    chunking::Chunk,
    collections::{CollectionManager, SHARED_COLLECTION, SPECIFIC_COLLECTION},
    error::Result,
    filter::FilterSet,
};

/// Sentinel returned when no tier has evidence for the query.
///
/// Downstream callers hand this to the generator verbatim; it is a
/// documented value, never an empty string.
pub const NOT_FOUND: &str = "Not found in context.";

/// Label inserted between the specific and shared tiers in rendered context.
pub const TIER_SEPARATOR: &str = "---- shared reference material ----";

/// Which collection a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Specific,
    Shared,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Specific => f.write_str(SPECIFIC_COLLECTION),
            Tier::Shared => f.write_str(SHARED_COLLECTION),
        }
    }
}

/// A retrieved chunk annotated with its tier and similarity score.
#[derive(Debug, Clone)]
pub struct TierHit {
    pub tier: Tier,
    pub chunk: Chunk,
    pub score: f32,
}

/// Read-side facade over the collection manager.
pub struct Retriever<'a> {
    manager: &'a CollectionManager,
}

impl<'a> Retriever<'a> {
    pub fn new(manager: &'a CollectionManager) -> Self {
        Self { manager }
    }

    /// Retrieve the merged tier hits for a manufacturer/model/attribute
    /// query. Empty fields are omitted from the query text and filters.
    ///
    /// Filters are AND-combined, but a tier is never silently emptied by
    /// the model-number condition: when a tier has no hit matching both
    /// terms, it is retried with the manufacturer filter alone, so generic
    /// manufacturer material still surfaces as fallback evidence.
    pub fn retrieve_chunks(
        &self,
        manufacturer: &str,
        model_number: &str,
        query_attr: &str,
        k: usize,
    ) -> Result<Vec<TierHit>> {
        let query_text = build_query_text(manufacturer, model_number, query_attr);
        if query_text.is_empty() {
            return Ok(Vec::new());
        }
        let filters = build_filters(manufacturer, model_number)?;
        let fallback = if !manufacturer.trim().is_empty() && !model_number.trim().is_empty() {
            Some(build_filters(manufacturer, "")?)
        } else {
            None
        };

        let specific =
            self.tier_hits(SPECIFIC_COLLECTION, &query_text, &filters, fallback.as_ref(), k)?;
        let shared =
            self.tier_hits(SHARED_COLLECTION, &query_text, &filters, fallback.as_ref(), k)?;

        tracing::debug!(
            query = %query_text,
            specific = specific.len(),
            shared = shared.len(),
            "two-tier retrieval"
        );

        let mut hits = Vec::with_capacity(specific.len() + shared.len());
        hits.extend(specific.into_iter().map(|s| TierHit {
            tier: Tier::Specific,
            chunk: s.chunk,
            score: s.score,
        }));
        hits.extend(shared.into_iter().map(|s| TierHit {
            tier: Tier::Shared,
            chunk: s.chunk,
            score: s.score,
        }));
        Ok(hits)
    }

    fn tier_hits(
        &self,
        collection: &str,
        query_text: &str,
        filters: &FilterSet,
        fallback: Option<&FilterSet>,
        k: usize,
    ) -> Result<Vec<crate::index::ScoredChunk>> {
        let hits = self.manager.query(collection, query_text, filters, k)?;
        if hits.is_empty()
            && let Some(fallback) = fallback
        {
            return self.manager.query(collection, query_text, fallback, k);
        }
        Ok(hits)
    }

    /// Retrieve and render a context string bounded by the configured
    /// character budget. Returns [`NOT_FOUND`] when neither tier has hits.
    pub fn retrieve(
        &self,
        manufacturer: &str,
        model_number: &str,
        query_attr: &str,
        k: usize,
    ) -> Result<String> {
        let hits = self.retrieve_chunks(manufacturer, model_number, query_attr, k)?;
        if hits.is_empty() {
            return Ok(NOT_FOUND.to_string());
        }
        Ok(render_context(
            &hits,
            self.manager.config().max_context_chars,
        ))
    }
}

/// Join the non-empty trimmed fields with single spaces, in fixed order.
pub fn build_query_text(manufacturer: &str, model_number: &str, query_attr: &str) -> String {
    [manufacturer, model_number, query_attr]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the AND-combined keyword filters for the optional fields.
///
/// A model number never replaces the manufacturer condition; both must
/// match when both are supplied.
pub fn build_filters(manufacturer: &str, model_number: &str) -> Result<FilterSet> {
    let mut filters = FilterSet::new();
    let manufacturer = manufacturer.trim();
    if !manufacturer.is_empty() {
        filters.and_term(manufacturer)?;
    }
    let model_number = model_number.trim();
    if !model_number.is_empty() {
        filters.and_term(model_number)?;
    }
    Ok(filters)
}

/// Citation header for one chunk: source file, page span, short chunk id.
fn citation_header(chunk: &Chunk) -> String {
    match chunk.page_range {
        Some((lo, hi)) if lo == hi => {
            format!("[{} | page {} | {}]", chunk.source_id, lo, chunk.short_id())
        }
        Some((lo, hi)) => format!(
            "[{} | pages {}-{} | {}]",
            chunk.source_id,
            lo,
            hi,
            chunk.short_id()
        ),
        None => format!("[{} | {}]", chunk.source_id, chunk.short_id()),
    }
}

/// Render hits into a context string under `max_chars`.
///
/// Chunks are added whole, each with an intact citation header; the first
/// chunk that would overflow the budget ends the rendering (it is omitted,
/// never truncated mid-chunk). When both tiers contribute, the shared tier
/// is introduced by [`TIER_SEPARATOR`].
pub fn render_context(hits: &[TierHit], max_chars: usize) -> String {
    let mut out = String::new();
    let mut shared_started = false;

    for hit in hits {
        let mut block = String::new();
        if hit.tier == Tier::Shared && !shared_started && !out.is_empty() {
            block.push_str(TIER_SEPARATOR);
            block.push('\n');
        }
        block.push_str(&citation_header(&hit.chunk));
        block.push('\n');
        block.push_str(hit.chunk.text.trim());
        block.push_str("\n\n");

        if out.len() + block.len() > max_chars {
            break;
        }
        if hit.tier == Tier::Shared {
            shared_started = true;
        }
        out.push_str(&block);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, pages: Option<(u32, u32)>, text: &str) -> Chunk {
        Chunk::new(source, pages, 0, text.to_string())
    }

    fn hit(tier: Tier, source: &str, text: &str) -> TierHit {
        TierHit {
            tier,
            chunk: chunk(source, Some((1, 2)), text),
            score: 0.5,
        }
    }

    #[test]
    fn query_text_joins_non_empty_fields_in_order() {
        assert_eq!(
            build_query_text("Fujitec", "EXDN", "Rated Load"),
            "Fujitec EXDN Rated Load"
        );
        assert_eq!(build_query_text("", "EXDN", "Rated Load"), "EXDN Rated Load");
        assert_eq!(build_query_text("Fujitec", "  ", "Rated Load"), "Fujitec Rated Load");
        assert_eq!(build_query_text("", "", ""), "");
    }

    #[test]
    fn filters_and_combine_manufacturer_and_model() {
        let filters = build_filters("Fujitec", "EXDN").unwrap();
        assert!(filters.matches(&chunk("x.pdf", None, "Fujitec EXDN datasheet")));
        assert!(!filters.matches(&chunk("x.pdf", None, "Fujitec brochure")));
        assert!(!filters.matches(&chunk("x.pdf", None, "EXDN datasheet")));
    }

    #[test]
    fn manufacturer_only_filter_is_not_narrowed_by_absent_model() {
        let filters = build_filters("Fujitec", "").unwrap();
        assert!(filters.matches(&chunk("x.pdf", None, "Fujitec brochure")));
    }

    #[test]
    fn citation_header_formats_page_spans() {
        let c = chunk("manual.pdf", Some((3, 7)), "text");
        assert_eq!(
            citation_header(&c),
            format!("[manual.pdf | pages 3-7 | {}]", c.short_id())
        );

        let c = chunk("manual.pdf", Some((4, 4)), "text");
        assert!(citation_header(&c).contains("| page 4 |"));

        let c = chunk("manual.pdf", None, "text");
        assert!(!citation_header(&c).contains("page"));
    }

    #[test]
    fn render_keeps_specific_before_shared_with_separator() {
        let hits = vec![
            hit(Tier::Specific, "exdn.pdf", "rated load 1000 kg"),
            hit(Tier::Shared, "generic.pdf", "general fujitec info"),
        ];
        let out = render_context(&hits, 10_000);

        let specific_pos = out.find("rated load 1000 kg").unwrap();
        let separator_pos = out.find(TIER_SEPARATOR).unwrap();
        let shared_pos = out.find("general fujitec info").unwrap();
        assert!(specific_pos < separator_pos);
        assert!(separator_pos < shared_pos);
    }

    #[test]
    fn render_without_specific_tier_has_no_separator() {
        let hits = vec![hit(Tier::Shared, "generic.pdf", "general info")];
        let out = render_context(&hits, 10_000);
        assert!(!out.contains(TIER_SEPARATOR));
        assert!(out.contains("general info"));
    }

    #[test]
    fn render_omits_whole_chunks_that_overflow() {
        let hits = vec![
            hit(Tier::Specific, "a.pdf", "short"),
            hit(Tier::Specific, "b.pdf", &"x".repeat(500)),
        ];
        let out = render_context(&hits, 120);
        assert!(out.contains("short"));
        assert!(!out.contains("xxx"), "oversized chunk must be omitted, not cut");
        assert!(out.len() <= 120);
        // The included chunk keeps its full citation header.
        assert!(out.contains("[a.pdf | pages 1-2 |"));
    }

    #[test]
    fn render_budget_never_exceeded() {
        let hits: Vec<TierHit> = (0..10)
            .map(|i| hit(Tier::Specific, "a.pdf", &format!("chunk number {i} body text")))
            .collect();
        for budget in [0, 50, 200, 1000] {
            assert!(render_context(&hits, budget).len() <= budget);
        }
    }
}
