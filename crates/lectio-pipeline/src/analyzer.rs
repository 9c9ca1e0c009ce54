//! Material analysis: turn an uploaded document into suggested topics.
//!
//! The analyzer is a thin adapter over the LLM plus a file-backed
//! repository of analysis results, so `/generate` can validate the
//! `analysis_id` it receives without re-reading the source document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use lectio_llm::{Content, GenerateRequest, LlmClient, Part};

use crate::error::{PipelineError, PipelineResult};

/// One suggested topic from analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedTopic {
    #[serde(default)]
    pub index: usize,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_duration: u64,
}

/// Persisted result of analyzing one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub file_id: String,
    pub material_type: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub subject_area: String,
    #[serde(default)]
    pub suggested_topics: Vec<SuggestedTopic>,
}

/// File-backed analysis store.
pub struct AnalysisRepository {
    dir: PathBuf,
}

impl AnalysisRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn save(&self, record: &AnalysisRecord) -> PipelineResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", record.analysis_id));
        lectio_store::atomic::write_json_atomic(&path, record)?;
        Ok(())
    }

    pub fn get(&self, analysis_id: &str) -> Option<AnalysisRecord> {
        let path = self.dir.join(format!("{analysis_id}.json"));
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

pub struct Analyzer<'a> {
    client: &'a dyn LlmClient,
}

impl<'a> Analyzer<'a> {
    pub fn new(client: &'a dyn LlmClient) -> Self {
        Self { client }
    }

    /// Analyze an uploaded document and suggest topics.
    pub async fn analyze(
        &self,
        file_id: &str,
        file_path: &Path,
        language: &str,
    ) -> PipelineResult<AnalysisRecord> {
        let (parts, material_type) = document_parts(file_path).await?;
        let prompt = format!(
            r#"Analyze this learning material and respond with JSON:
{{"summary": "...", "subject_area": "...", "suggested_topics": [{{"index": 0, "title": "...", "description": "...", "estimated_duration": <seconds>}}]}}
Suggest 3 to 6 teachable topics. Write titles and descriptions in language "{language}"."#
        );

        let mut content_parts = vec![Part::text(prompt)];
        content_parts.extend(parts);
        let request = GenerateRequest::new(
            self.client.default_model(),
            vec![Content::user(content_parts)],
        )
        .with_json_output();

        let response = self.client.generate(request).await?;
        let text_fallback = response.text_or_empty().to_string();
        let value = response
            .parsed_json
            .or_else(|| lectio_llm::gemini::parse_json_lenient(&text_fallback))
            .ok_or_else(|| {
                PipelineError::AnalysisFailed("analysis response was not JSON".to_string())
            })?;

        let mut topics: Vec<SuggestedTopic> = value
            .get("suggested_topics")
            .cloned()
            .and_then(|t| serde_json::from_value(t).ok())
            .unwrap_or_default();
        for (i, topic) in topics.iter_mut().enumerate() {
            topic.index = i;
        }
        if topics.is_empty() {
            return Err(PipelineError::AnalysisFailed(
                "analysis produced no topics".to_string(),
            ));
        }

        let record = AnalysisRecord {
            analysis_id: Uuid::new_v4().to_string(),
            file_id: file_id.to_string(),
            material_type,
            summary: value["summary"].as_str().unwrap_or_default().to_string(),
            subject_area: value["subject_area"]
                .as_str()
                .unwrap_or("general")
                .to_string(),
            suggested_topics: topics,
        };
        info!(
            analysis_id = %record.analysis_id,
            topics = record.suggested_topics.len(),
            "Material analyzed"
        );
        Ok(record)
    }
}

/// Load the document into LLM parts, classifying it as text or image/pdf.
async fn document_parts(path: &Path) -> PipelineResult<(Vec<Part>, String)> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let bytes = tokio::fs::read(path).await?;

    let (part, material_type) = match ext.as_str() {
        "pdf" => (Part::image(&bytes, "application/pdf"), "pdf"),
        "png" => (Part::image(&bytes, "image/png"), "image"),
        "jpg" | "jpeg" => (Part::image(&bytes, "image/jpeg"), "image"),
        _ => (
            Part::text(String::from_utf8_lossy(&bytes).into_owned()),
            "text",
        ),
    };
    Ok((vec![part], material_type.to_string()))
}

/// Resolve selected topic indices against an analysis into the script
/// generator's topic payload.
pub fn resolve_topic_payload(
    analysis: &AnalysisRecord,
    selected: &[usize],
) -> PipelineResult<Value> {
    if selected.is_empty() {
        return Err(PipelineError::invalid_input(
            "At least one topic must be selected for generation",
        ));
    }
    let chosen: Vec<&SuggestedTopic> = selected
        .iter()
        .filter_map(|i| analysis.suggested_topics.iter().find(|t| t.index == *i))
        .collect();
    if chosen.is_empty() {
        return Err(PipelineError::invalid_input(
            "Selected topic indices are invalid for this analysis",
        ));
    }

    let titles: Vec<String> = chosen.iter().map(|t| t.title.trim().to_string()).collect();
    let descriptions: Vec<String> = chosen
        .iter()
        .map(|t| t.description.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    let estimated_total: u64 = chosen.iter().map(|t| t.estimated_duration).sum();

    let mut title_head = titles.iter().take(3).cloned().collect::<Vec<_>>().join(" + ");
    if titles.len() > 3 {
        title_head = format!("{title_head} + {} more", titles.len() - 3);
    }

    Ok(json!({
        "title": if title_head.is_empty() { "Selected Topics".to_string() } else { title_head },
        "description": if descriptions.is_empty() { analysis.summary.clone() } else { descriptions.join(" ") },
        "estimated_duration": estimated_total,
        "subject_area": analysis.subject_area,
        "selected_topic_indices": selected,
        "selected_topic_titles": titles,
        "analysis_id": analysis.analysis_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> AnalysisRecord {
        AnalysisRecord {
            analysis_id: "a1".into(),
            file_id: "f1".into(),
            material_type: "text".into(),
            summary: "Summary.".into(),
            subject_area: "math".into(),
            suggested_topics: (0..5)
                .map(|i| SuggestedTopic {
                    index: i,
                    title: format!("Topic {i}"),
                    description: format!("About {i}"),
                    estimated_duration: 60,
                })
                .collect(),
        }
    }

    #[test]
    fn test_repository_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = AnalysisRepository::new(tmp.path());
        repo.save(&analysis()).unwrap();
        let loaded = repo.get("a1").unwrap();
        assert_eq!(loaded.file_id, "f1");
        assert_eq!(loaded.suggested_topics.len(), 5);
        assert!(repo.get("missing").is_none());
    }

    #[test]
    fn test_topic_payload_title_head_caps_at_three() {
        let payload = resolve_topic_payload(&analysis(), &[0, 1, 2, 3, 4]).unwrap();
        assert_eq!(
            payload["title"],
            "Topic 0 + Topic 1 + Topic 2 + 2 more"
        );
        assert_eq!(payload["estimated_duration"], 300);
        assert_eq!(payload["analysis_id"], "a1");
    }

    #[test]
    fn test_topic_payload_rejects_empty_selection() {
        let err = resolve_topic_payload(&analysis(), &[]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_topic_payload_rejects_unknown_indices() {
        let err = resolve_topic_payload(&analysis(), &[99]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
