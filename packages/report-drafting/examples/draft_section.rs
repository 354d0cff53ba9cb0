//! Draft a Site Observations section end to end with mock collaborators.
//!
//! Seeds the in-memory index with historical sections, collects evidence
//! from two photos (one unreadable), a prior report and a field note, then
//! prints the draft with its citations.
//!
//! Swap the mocks for `providers::OpenAI` or `providers::Ollama` to run
//! against real models.
//!
//! ```bash
//! RUST_LOG=report_drafting=debug cargo run --example draft_section
//! ```

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use report_drafting::testing::{seed_example_sections, MockGenerator};
use report_drafting::{
    Collaborators, Condition, DocumentAsset, DocumentType, DraftingConfig, ImageAsset,
    MemoryAssetSource, MemoryIndex, MockEmbedder, MockParser, MockVision, ProjectContext,
    QueryContext, SectionDrafter, SectionRequest, SectionType, Severity, VisionAnalysis,
};

const DIMENSION: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let roof = VisionAnalysis {
        description: "Low-slope roof, membrane installed".into(),
        building_type: Some("commercial".into()),
        conditions: vec![Condition {
            category: "roof".into(),
            issue: "Ponding water at drain".into(),
            severity: Some(Severity::Moderate),
            location: Some("northeast corner".into()),
        }],
        confidence: Some(0.85),
        ..Default::default()
    };

    let assets = MemoryAssetSource::new()
        .with_image(ImageAsset::new("img-45", "IMG_045.jpg", b"roof-photo".to_vec()))
        .with_image(ImageAsset::new("img-46", "IMG_046.jpg", b"blurry-photo".to_vec()))
        .with_document(
            DocumentAsset::new(
                "doc-11",
                "sor-11.pdf",
                DocumentType::PriorSor,
                b"prior report".to_vec(),
            )
            .with_date(NaiveDate::from_ymd_opt(2026, 1, 12).ok_or("invalid date")?),
        );

    let collaborators = Collaborators {
        vision: Arc::new(
            MockVision::new()
                .with_analysis(b"roof-photo".to_vec(), roof)
                .fail_on(b"blurry-photo".to_vec()),
        ),
        parser: Arc::new(MockParser::new().with_fields(
            b"prior report".to_vec(),
            json!({
                "sections": { "building_observations": "Roof membrane 80% installed on Building A" },
                "percent_complete": 58
            }),
        )),
        assets: Arc::new(assets),
        index: Arc::new(MemoryIndex::new(DIMENSION)),
        embedder: Arc::new(MockEmbedder::new(DIMENSION)),
        generator: Arc::new(MockGenerator::new()),
    };

    let drafter = SectionDrafter::new(collaborators, DraftingConfig::from_env()?);
    let seeded = seed_example_sections(drafter.retrieval()).await?;
    println!("Seeded {} exemplar sections\n", seeded.len());

    let project = ProjectContext::new("Riverside Commons")
        .with_report_number("12")
        .with_inspection_date(NaiveDate::from_ymd_opt(2026, 2, 10).ok_or("invalid date")?);
    let request = SectionRequest::new(SectionType::SiteObservations, project)
        .with_images(["img-45", "img-46"])
        .with_documents(["doc-11"])
        .with_narrative("Roofing crew on site; drains not yet connected.")
        .with_query(
            QueryContext::new()
                .with_building_type("commercial")
                .with_issues(["ponding water"]),
        );

    let outcome = drafter.draft_section(&request).await?;
    let draft = &outcome.draft;

    println!("== {} ({:?}) ==", draft.section_type.title(), draft.status);
    println!("{}\n", draft.content);
    println!("Confidence: {:.2}", draft.confidence);
    for reference in &draft.evidence_references {
        println!("  cited   {} {}", reference.source_type, reference.label);
    }
    for reference in &draft.unused_evidence {
        println!("  unused  {} {}", reference.source_type, reference.label);
    }
    for warning in &outcome.warnings {
        println!("  skipped {}: {}", warning.source_id, warning.message);
    }

    Ok(())
}
