//! Content summarization with structured analysis extraction.

use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, error};

use prismis_core::{Result, SourceKind};

use crate::client::LlmClient;

/// Word-count boundary below which short forum posts get the brief prompt.
const BRIEF_WORD_LIMIT: usize = 300;
/// Word-count boundary above which video transcripts get the detailed prompt.
const DETAILED_WORD_LIMIT: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    Brief,
    Detailed,
    Diff,
    Standard,
}

impl SummaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryMode::Brief => "brief",
            SummaryMode::Detailed => "detailed",
            SummaryMode::Diff => "diff",
            SummaryMode::Standard => "standard",
        }
    }

    /// Pick the prompt variant from content characteristics.
    pub fn select(word_count: usize, kind: Option<SourceKind>) -> Self {
        match kind {
            Some(SourceKind::File) => SummaryMode::Diff,
            Some(SourceKind::Forum) if word_count < BRIEF_WORD_LIMIT => SummaryMode::Brief,
            Some(SourceKind::Video) if word_count > DETAILED_WORD_LIMIT => SummaryMode::Detailed,
            _ => SummaryMode::Standard,
        }
    }
}

/// Structured analysis extracted alongside the display summary.
#[derive(Debug, Clone)]
pub struct ContentSummary {
    /// Card display summary, 400 chars max.
    pub summary: String,
    /// Extended markdown summary for in-app reading.
    pub reading_summary: String,
    pub alpha_insights: Vec<String>,
    pub patterns: Vec<String>,
    pub entities: Vec<String>,
    pub quotes: Vec<String>,
    pub tools: Vec<String>,
    pub urls: Vec<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
pub struct SummarizeRequest {
    pub content: String,
    pub title: String,
    pub url: String,
    pub source_kind: Option<SourceKind>,
    pub source_name: String,
    /// Fetcher metrics (author, subreddit, view count, ...) surfaced to
    /// the prompt so the model does not invent them.
    pub metrics: Option<Value>,
}

pub struct Summarizer {
    client: LlmClient,
}

impl Summarizer {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Summarize and extract structured insights. Returns `None` when the
    /// model reply is missing required fields: the caller then stores the
    /// item without LLM data rather than failing the pipeline.
    pub async fn summarize_with_analysis(
        &self,
        request: &SummarizeRequest,
    ) -> Result<Option<ContentSummary>> {
        if request.content.trim().is_empty() {
            debug!("empty content, skipping summarization");
            return Ok(None);
        }

        let word_count = request.content.split_whitespace().count();
        let mode = SummaryMode::select(word_count, request.source_kind);
        let system_prompt = system_prompt_for(mode);
        let user_prompt = build_user_prompt(request);

        debug!(
            words = word_count,
            mode = mode.as_str(),
            title = %request.title,
            "summarizing content"
        );

        let started = Instant::now();
        let result = self.client.chat_json(&system_prompt, &user_prompt).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let reply = match result {
            Ok(reply) => {
                prismis_observability::log(
                    "llm.call",
                    json!({
                        "action": "summarize",
                        "model": self.client.model(),
                        "duration_ms": duration_ms,
                        "status": "success",
                    }),
                );
                reply
            }
            Err(e) => {
                prismis_observability::log(
                    "llm.call",
                    json!({
                        "action": "summarize",
                        "model": self.client.model(),
                        "duration_ms": duration_ms,
                        "status": "error",
                        "error": e.to_string(),
                    }),
                );
                return Err(e);
            }
        };

        for field in ["summary", "reading_summary", "alpha_insights", "patterns", "entities", "quotes"]
        {
            if reply.get(field).is_none() {
                error!(field, "LLM analysis missing required field");
                return Ok(None);
            }
        }

        let mut summary = reply["summary"].as_str().unwrap_or_default().to_string();
        if summary.chars().count() > 400 {
            summary = summary.chars().take(400).collect();
        }

        Ok(Some(ContentSummary {
            summary,
            reading_summary: reply["reading_summary"].as_str().unwrap_or_default().to_string(),
            alpha_insights: string_list(&reply, "alpha_insights"),
            patterns: string_list(&reply, "patterns"),
            entities: string_list(&reply, "entities"),
            quotes: string_list(&reply, "quotes"),
            tools: string_list(&reply, "tools"),
            urls: string_list(&reply, "urls"),
            metadata: json!({
                "model": self.client.model(),
                "content_length": request.content.len(),
                "word_count": word_count,
                "summarization_mode": mode.as_str(),
            }),
        }))
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn build_user_prompt(request: &SummarizeRequest) -> String {
    let mut metadata = String::new();
    if !request.source_name.is_empty() {
        metadata.push_str(&format!("Source Name: {}\n", request.source_name));
    }
    if let Some(metrics) = &request.metrics {
        if let Some(author) = metrics.get("author").and_then(Value::as_str) {
            metadata.push_str(&format!("Author: {author}\n"));
        }
        if let Some(subreddit) = metrics.get("subreddit").and_then(Value::as_str) {
            metadata.push_str(&format!("Subreddit: r/{subreddit}\n"));
        }
        if let Some(views) = metrics.get("view_count").and_then(Value::as_u64) {
            metadata.push_str(&format!("View Count: {views}\n"));
        }
    }

    let kind = request
        .source_kind
        .map(|k| k.as_str())
        .unwrap_or("unknown");

    format!(
        "Analyze this content and extract structured insights:\n\n\
         Title: {title}\n\
         Source Type: {kind}\n\
         {metadata}URL: {url}\n\n\
         IMPORTANT: Use the provided metadata above. Do NOT infer or guess author names, \
         channel names, or other metadata not explicitly provided.\n\n\
         CRITICAL FOR URL EXTRACTION: The source URL above ({url}) is where this content \
         came from. DO NOT include it in your extracted URLs - only extract URLs that are \
         referenced WITHIN the content itself.\n\n\
         CONTENT:\n{content}",
        title = request.title,
        url = request.url,
        content = request.content,
    )
}

fn system_prompt_for(mode: SummaryMode) -> String {
    match mode {
        SummaryMode::Diff => DIFF_SYSTEM_PROMPT.to_string(),
        SummaryMode::Brief => STANDARD_SYSTEM_PROMPT.replace(
            READING_SUMMARY_STANDARD,
            "- Reading summary: minimal, roughly 500-800 chars. Focus on core points only since the original is already short:",
        ),
        SummaryMode::Detailed => STANDARD_SYSTEM_PROMPT.replace(
            READING_SUMMARY_STANDARD,
            "- Reading summary: comprehensive, roughly 20-25% of the original length. Provide richer detail and deeper analysis since the source is extensive:",
        ),
        SummaryMode::Standard => STANDARD_SYSTEM_PROMPT.to_string(),
    }
}

const READING_SUMMARY_STANDARD: &str =
    "- Reading summary: approximately 10-15% of original content length (minimum 2000 chars), comprehensive MARKDOWN:";

const STANDARD_SYSTEM_PROMPT: &str = r##"You are an expert content analyst. Follow these steps SEQUENTIALLY.

CRITICAL: You MUST respond with ONLY valid JSON. Start directly with { and end directly with }. No preamble, no explanation, ONLY JSON.

STEP 1: CREATE SUMMARIES
- Summary: 400 chars max, capture key information for card display
- Reading summary: approximately 10-15% of original content length (minimum 2000 chars), comprehensive MARKDOWN:
  * Start with # Title matching the content
  * ## Overview section - brief context (2-3 sentences)
  * ## Key Points - bullet list of main takeaways
  * ## Summary - the main section: a comprehensive narrative covering what was discussed, arguments made, and the flow of ideas
  * ## Takeaways - what this means and why it matters
  * Clean markdown only, no HTML; use \n for newlines and escape quotes

STEP 2: EXTRACT INSIGHTS & PATTERNS
- Alpha insights: universal truths grounded in the content (up to 10 items)
- Patterns: specific methods, frameworks, or approaches described (3-10 items)

STEP 3: EXTRACT HASHTAG-STYLE TAGS (entities)
Simple, searchable, one concept each. 3-5 essential tags; 3 great tags beat 5 mediocre ones.
- Single words preferred, hyphens for compound concepts, all lowercase
- NO SPACES EVER; no duplicates
- Pick the essence, not the description ("ai language models" -> "ai")

STEP 4: EXTRACT MEMORABLE QUOTES
0-3 quotes that are GENUINELY insightful: counterintuitive insights, surprising facts, expert wisdom. Exact text from the content only, never paraphrased. Many articles have none - return [] rather than mundane sentences.

STEP 5: EXTRACT SUBSTANTIVE TOOLS
Only tools the content discusses substantively (what problem they solve, why they matter). Skip passing mentions and standard stacks. Maximum 5.

STEP 6: FIND REFERENCED URLS
URLs actually referenced WITHIN the content; never the source's own URL; never invented. Maximum 5.

OUTPUT FORMAT:
{
  "summary": "Brief summary of the main points",
  "reading_summary": "# Title\n\n## Overview\n...\n\n## Key Points\n- ...\n\n## Summary\n...\n\n## Takeaways\n...",
  "alpha_insights": ["..."],
  "patterns": ["..."],
  "entities": ["tag1", "tag2", "tag3"],
  "quotes": ["..."],
  "tools": ["tool1"],
  "urls": ["https://example.com/referenced"]
}"##;

const DIFF_SYSTEM_PROMPT: &str = r#"You are an expert at analyzing unified diffs. The content is a UNIFIED DIFF showing changes to a file.

CRITICAL: You MUST respond with ONLY valid JSON. Start with { and end with }. No preamble.

UNDERSTANDING UNIFIED DIFF FORMAT:
- Lines starting with "---" and "+++" are file headers (ignore these)
- Lines starting with "@@" show where changes occur
- Lines starting with "-" are REMOVED content; lines starting with "+" are ADDED content
- Unprefixed lines are CONTEXT shown for reference

YOUR TASK: Analyze ONLY what actually changed (+ and - lines), NOT the context lines.

STEP 1: CREATE SUMMARIES
- Summary: 400 chars max describing what CHANGED
- Reading summary: MARKDOWN with # What Changed, ## Changes Made (before/after where useful), ## Impact

STEP 2: EXTRACT INSIGHTS & PATTERNS
- Alpha insights: what the changes reveal
- Patterns: patterns appearing in the changes

STEP 3: EXTRACT TAGS (entities)
3-5 tags about what changed (e.g. ["documentation", "url-migration"])

STEP 4: EXTRACT QUOTES
Usually empty for diffs; only genuinely insightful added text.

STEP 5: EXTRACT TOOLS
Only tools ADDED or REMOVED in the changes.

STEP 6: EXTRACT URLS
Only URLs ADDED in the changes (lines starting with "+").

Return JSON with: summary, reading_summary, alpha_insights, patterns, entities, quotes, tools, urls"#;
