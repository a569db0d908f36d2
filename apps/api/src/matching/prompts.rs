// Prompt constants for the matching pipeline.
// Reuses the JSON-only fragment from llm_client::prompts.

/// Matching prompt template. Replace `{payload}` (the request JSON) and
/// `{json_only}` before sending.
pub const MATCH_PROMPT_TEMPLATE: &str = r#"Analyze this CV and job description data and return JSON:

{payload}

Return only this JSON format:
{"matched_requirements":[{"requirement":"Python","cv_evidence":"Python skills","match_strength":"high","relevance_score":8}],"missing_requirements":[{"requirement":"Chemistry","importance":"critical"}],"overall_analysis":{"compatibility_score":60,"strengths":["Python skills"],"gaps":["Chemistry background"]},"detailed_breakdown":{"education_match":0,"skills_match":80,"experience_match":0,"tools_frameworks_match":0}}

Scores: compatibility_score and every detailed_breakdown field are integers 0-100; relevance_score is 0-10.
{json_only}"#;
