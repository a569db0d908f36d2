//! Result shape of a CV ↔ job description analysis.
//!
//! Every field is optional and decoded leniently: the model's output is
//! accepted as long as it is a JSON object, and scores are clamped into range
//! afterwards by [`MatchingAnalysis::normalize`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchedRequirement {
    pub requirement: Option<String>,
    pub cv_evidence: Option<String>,
    pub match_strength: Option<String>,
    /// 0 – 10
    #[serde(deserialize_with = "lenient_score")]
    pub relevance_score: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingRequirement {
    pub requirement: Option<String>,
    pub importance: Option<String>,
    pub alternative_skills: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallAnalysis {
    /// 0 – 100
    #[serde(deserialize_with = "lenient_score")]
    pub compatibility_score: Option<i64>,
    pub strengths: Option<Vec<String>>,
    pub gaps: Option<Vec<String>>,
    pub recommendations: Option<Vec<String>>,
}

/// Per-category scores, each 0 – 100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailedBreakdown {
    #[serde(deserialize_with = "lenient_score")]
    pub education_match: Option<i64>,
    #[serde(deserialize_with = "lenient_score")]
    pub skills_match: Option<i64>,
    #[serde(deserialize_with = "lenient_score")]
    pub experience_match: Option<i64>,
    #[serde(deserialize_with = "lenient_score")]
    pub tools_frameworks_match: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingAnalysis {
    pub matched_requirements: Option<Vec<MatchedRequirement>>,
    pub missing_requirements: Option<Vec<MissingRequirement>>,
    pub overall_analysis: Option<OverallAnalysis>,
    pub detailed_breakdown: Option<DetailedBreakdown>,
}

impl MatchingAnalysis {
    /// Placeholder returned when every completion attempt failed.
    pub fn unavailable() -> Self {
        Self {
            matched_requirements: Some(vec![]),
            missing_requirements: Some(vec![]),
            overall_analysis: Some(OverallAnalysis {
                compatibility_score: Some(0),
                strengths: Some(vec![]),
                gaps: Some(vec![
                    "Analysis unavailable: the model did not return a usable response".to_string(),
                ]),
                recommendations: Some(vec!["Retry the request later".to_string()]),
            }),
            detailed_breakdown: Some(DetailedBreakdown {
                education_match: Some(0),
                skills_match: Some(0),
                experience_match: Some(0),
                tools_frameworks_match: Some(0),
            }),
        }
    }

    /// Clamps every score into its documented range.
    pub fn normalize(mut self) -> Self {
        for matched in self.matched_requirements.iter_mut().flatten() {
            clamp(&mut matched.relevance_score, 10);
        }
        if let Some(overall) = self.overall_analysis.as_mut() {
            clamp(&mut overall.compatibility_score, 100);
        }
        if let Some(breakdown) = self.detailed_breakdown.as_mut() {
            clamp(&mut breakdown.education_match, 100);
            clamp(&mut breakdown.skills_match, 100);
            clamp(&mut breakdown.experience_match, 100);
            clamp(&mut breakdown.tools_frameworks_match, 100);
        }
        self
    }

    pub fn digest(&self) -> AnalysisDigest {
        let matched = self.matched_requirements.as_deref().unwrap_or_default();
        let missing = self.missing_requirements.as_deref().unwrap_or_default();
        let breakdown = self.detailed_breakdown.clone().unwrap_or_default();

        AnalysisDigest {
            compatibility_score: self
                .overall_analysis
                .as_ref()
                .and_then(|o| o.compatibility_score),
            total_matched_requirements: matched.len(),
            total_missing_requirements: missing.len(),
            critical_missing: missing
                .iter()
                .filter(|m| m.importance.as_deref() == Some("critical"))
                .count(),
            high_strength_matches: matched
                .iter()
                .filter(|m| m.match_strength.as_deref() == Some("high"))
                .count(),
            education_score: breakdown.education_match,
            skills_score: breakdown.skills_match,
            experience_score: breakdown.experience_match,
            tools_score: breakdown.tools_frameworks_match,
        }
    }
}

/// Headline numbers of an analysis, used for request logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisDigest {
    pub compatibility_score: Option<i64>,
    pub total_matched_requirements: usize,
    pub total_missing_requirements: usize,
    pub critical_missing: usize,
    pub high_strength_matches: usize,
    pub education_score: Option<i64>,
    pub skills_score: Option<i64>,
    pub experience_score: Option<i64>,
    pub tools_score: Option<i64>,
}

fn clamp(score: &mut Option<i64>, max: i64) {
    if let Some(value) = score.as_mut() {
        *value = (*value).clamp(0, max);
    }
}

/// Accepts integers, floats (rounded) and numeric strings; anything else is `None`.
fn lenient_score<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().map(|f| f.round() as i64),
        Some(Value::String(s)) => s
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .ok()
            .map(|f| f.round() as i64),
        _ => None,
    })
}
