//! Plain-text rendering of results for the LLM-facing caller.

use crate::document::ScoredResult;

/// Render ranked resources as a bulleted list.
///
/// Virtual resources are annotated "available statewide/online"; resources
/// with a resolved distance carry it; resources with neither stay bare.
pub fn format_results(results: &[ScoredResult]) -> String {
    if results.is_empty() {
        return "No relevant resources found.".to_string();
    }

    let mut lines = Vec::with_capacity(results.len());
    for result in results {
        let annotation = if result.is_virtual {
            " (available statewide/online)".to_string()
        } else if let Some(distance_km) = result.distance_km {
            format!(" ({distance_km:.1} km away)")
        } else {
            String::new()
        };
        lines.push(format!("- {} (score: {:.2}){annotation}", result.document.text, result.final_score));
    }
    lines.join("\n")
}

/// Render guidance articles separated for prompt injection.
pub fn format_guidance(texts: &[String]) -> String {
    if texts.is_empty() {
        return "No specific documents found for that query.".to_string();
    }
    texts.join("\n---\n")
}
