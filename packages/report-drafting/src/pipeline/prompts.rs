//! LLM prompts for the drafting pipeline.
//!
//! The vision and document prompts ask for JSON matching
//! [`VisionAnalysis`](crate::types::analysis::VisionAnalysis) and the
//! per-type field schemas. The generation prompt is rendered from a
//! [`GenerationRequest`] with a fixed layout so the same request always
//! produces byte-identical text.

use sha2::{Digest, Sha256};

use crate::types::analysis::DocumentType;
use crate::types::draft::{GenerationRequest, PromptPayload};
use crate::types::style::RewriteStyle;

/// Prompt for analyzing one site photograph.
pub const VISION_PROMPT: &str = r#"You are analyzing a construction site photograph for a Site Observation Report.

Describe what you observe, focusing on:
1. Building identification (type, materials, construction phase)
2. Condition assessment (damage, deterioration, defects)
3. Safety observations (hazards, compliance issues)
4. Materials visible
5. Location clues (orientation, signage, landmarks)

Respond in JSON format:
{
  "description": "Detailed description in professional engineering language",
  "building_type": "residential|commercial|industrial|mixed_use|unknown",
  "construction_phase": "foundation|framing|exterior|interior|finishing|complete",
  "conditions": [
    {
      "category": "roof|exterior|interior|structural|mechanical|electrical|plumbing|site",
      "issue": "description of condition",
      "severity": "minor|moderate|severe|critical",
      "location": "where on the building"
    }
  ],
  "materials": ["list", "of", "materials"],
  "safety_issues": ["list of safety concerns if any"],
  "location_clues": ["visual clues about location"],
  "confidence": 0.85
}"#;

/// System prompt for document field extraction.
pub const DOCUMENT_PARSE_SYSTEM: &str = "You are a document parsing assistant. \
Extract structured data from construction documents. Return valid JSON only.";

/// Prompt for extracting fields from a document.
pub const DOCUMENT_PARSE_PROMPT: &str = r#"Extract the following from this {doc_title}:
{schema}

Document text:
{text}"#;

const PRIOR_SOR_SCHEMA: &str = r#"{
  "report_date": "YYYY-MM-DD",
  "report_number": 0,
  "project_name": "",
  "sections": {
    "executive_summary": "content...",
    "budget_summary": "content...",
    "schedule_summary": "content...",
    "building_observations": ["observation 1", "observation 2"]
  },
  "recommendations": ["rec 1", "rec 2"],
  "percent_complete": 0
}"#;

const COST_REVIEW_SCHEMA: &str = r#"{
  "original_budget": 0,
  "current_budget": 0,
  "total_costs_to_date": 0,
  "percent_complete": 0,
  "change_orders": [
    {"number": "CO-001", "description": "", "amount": 0, "status": "approved|pending"}
  ],
  "line_items": [
    {"description": "", "budget": 0, "costs_to_date": 0, "percent_complete": 0}
  ]
}"#;

const PLAN_SCHEMA: &str = r#"{
  "project_name": "",
  "buildings": ["Building A", "Building B"],
  "phases": ["Phase 1", "Phase 2"],
  "specifications": ["spec 1", "spec 2"]
}"#;

const CHANGE_ORDER_SCHEMA: &str = r#"{
  "co_number": "",
  "date": "YYYY-MM-DD",
  "description": "",
  "amount": 0,
  "status": "approved|pending|rejected",
  "reason": ""
}"#;

const GENERIC_SCHEMA: &str = r#"{
  "document_type": "",
  "key_points": [],
  "dates": [],
  "amounts": [],
  "names": []
}"#;

/// JSON schema the parser is asked to fill for a document type.
pub fn document_schema(doc_type: &DocumentType) -> &'static str {
    match doc_type {
        DocumentType::PriorSor => PRIOR_SOR_SCHEMA,
        DocumentType::CostReview => COST_REVIEW_SCHEMA,
        DocumentType::Plan => PLAN_SCHEMA,
        DocumentType::ChangeOrder => CHANGE_ORDER_SCHEMA,
        DocumentType::Other(_) => GENERIC_SCHEMA,
    }
}

/// Build the field-extraction prompt, truncating `text` to `max_chars`.
pub fn format_document_prompt(doc_type: &DocumentType, text: &str, max_chars: usize) -> String {
    let text = truncate_document(text, max_chars);
    DOCUMENT_PARSE_PROMPT
        .replace("{doc_title}", &doc_type.title().to_lowercase())
        .replace("{schema}", document_schema(doc_type))
        .replace("{text}", &text)
}

/// Cut document text at `max_chars` characters, marking the cut.
pub fn truncate_document(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}\n\n[Document truncated...]", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Slice out the JSON object in a model reply.
///
/// Handles code fences and chatter around the object by taking everything
/// from the first `{` to the last `}`.
pub fn json_object_slice(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

/// Sample report text beyond this many characters is not sent for analysis.
pub const SAMPLE_REPORT_MAX_CHARS: usize = 5_000;

pub const SAMPLE_REPORT_SYSTEM: &str = r#"You split sample Site Observation Reports into sections and describe their writing style.
Label each section with one of: executive_summary, site_observations, building_status, budget_summary, schedule_summary, change_orders, safety_observations, recommendations.
Return JSON only:
{"sections":[{"type":"executive_summary","content":"..."}],"style":{"voice":"passive","tone":"formal"},"phrases":[],"terms":[]}"#;

/// Build the sample analysis request.
pub fn format_sample_prompt(content: &str) -> String {
    format!(
        "Extract sections from this report:\n\n{}",
        truncate_document(content, SAMPLE_REPORT_MAX_CHARS)
    )
}

const REWRITE_FORMAL_SOR: &str = "Rewrite the text in the formal style of a Site Observation Report. \
Use third person and passive voice where appropriate (\"It was observed that...\"). \
Use precise construction terminology. Keep every fact, date, quantity and name unchanged. \
Do not add information that is not in the text. Return only the rewritten text.";

const REWRITE_CONCISE: &str = "Rewrite the text to be concise and professional. \
Remove filler and repetition while keeping every fact, date, quantity and name. \
Do not add information that is not in the text. Return only the rewritten text.";

const REWRITE_DETAILED: &str = "Rewrite the text as a detailed professional observation. \
Expand shorthand into complete sentences and make locations and conditions explicit, \
but do not invent facts, dates, quantities or names. Return only the rewritten text.";

/// Base instructions for a rewrite style.
pub fn rewrite_instructions(style: RewriteStyle) -> &'static str {
    match style {
        RewriteStyle::FormalSor => REWRITE_FORMAL_SOR,
        RewriteStyle::Concise => REWRITE_CONCISE,
        RewriteStyle::Detailed => REWRITE_DETAILED,
    }
}

/// SHA-256 of the policy instructions, hex encoded.
pub fn policy_hash(instructions: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(instructions.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl GenerationRequest {
    /// Render the vendor-neutral prompt.
    ///
    /// Layout: heading, PROJECT CONTEXT, EVIDENCE (`[E1]..`), STYLE
    /// EXEMPLARS (`[X1]..`), closing directive.
    pub fn render(&self) -> PromptPayload {
        let title = self.section_type.title();
        let mut user = format!("Generate the {title} section for this Site Observation Report.\n\n");

        user.push_str("PROJECT CONTEXT:\n");
        for line in self.project_context.render_lines() {
            user.push_str(&line);
            user.push('\n');
        }

        user.push_str("\nEVIDENCE:\n");
        if self.evidence.is_empty() {
            user.push_str(
                "(none supplied; write a generic section and state that site evidence is pending)\n",
            );
        }
        for (i, item) in self.evidence.iter().enumerate() {
            user.push_str(&format!(
                "[{}] ({}) {}: {}\n",
                Self::evidence_tag(i),
                item.source_type(),
                item.label,
                item.content()
            ));
        }

        user.push_str("\nSTYLE EXEMPLARS (structure and tone only, never cite as fact):\n");
        if self.exemplars.is_empty() {
            user.push_str("(none available; use standard Site Observation Report structure)\n");
        }
        for (i, exemplar) in self.exemplars.iter().enumerate() {
            user.push_str(&format!(
                "[{}] {} (similarity {:.2}):\n{}\n",
                Self::exemplar_tag(i),
                exemplar.source_label,
                exemplar.similarity,
                exemplar.content.trim()
            ));
        }

        user.push_str(&format!(
            "\nGenerate the {title} section following the style of the exemplars.\n\
             Cite every observation with [Evidence: <tag or label>], e.g. [Evidence: E1].\n\
             Return only the section content, no additional formatting."
        ));

        PromptPayload {
            system: self.instructions.clone(),
            user,
        }
    }
}
