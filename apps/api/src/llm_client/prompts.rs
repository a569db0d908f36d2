// Cross-cutting prompt fragments shared by every caller of the LLM client.
// Feature-specific prompts live next to the feature (see matching/prompts.rs).

/// Appended to prompts whose completion is decoded with `extract_json`.
pub const JSON_ONLY_INSTRUCTION: &str = "Respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";
