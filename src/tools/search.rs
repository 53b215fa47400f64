use super::time;
use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::llm::{LlmClient, ResponseMode};
use crate::prompts;
use fancy_regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NO_RESULTS: &str =
    "No search results found. Please try a different query or check your internet connection.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    Auto,
    Summary,
    Analysis,
    Comparison,
    Learning,
}

impl std::str::FromStr for AnalysisType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "summary" => Ok(Self::Summary),
            "analysis" => Ok(Self::Analysis),
            "comparison" => Ok(Self::Comparison),
            "learning" => Ok(Self::Learning),
            other => Err(Error::config(format!("unknown analysis type: {other}"))),
        }
    }
}

// -- Serper wire format --

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
    #[serde(default)]
    knowledge_graph: Option<SerperKnowledgeGraph>,
}

#[derive(Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

#[derive(Deserialize)]
struct SerperKnowledgeGraph {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "website")]
    link: String,
}

/// Web search with LLM summarization. Serper.dev first, DuckDuckGo HTML as fallback.
pub struct WebSearchTool {
    http: HttpClient,
    llm: Arc<LlmClient>,
    serper_api_key: Option<String>,
    serper_url: String,
    duckduckgo_url: String,
    max_results: usize,
    context_results: usize,
}

impl WebSearchTool {
    pub fn new(config: &SearchConfig, llm: Arc<LlmClient>, http: HttpClient) -> Self {
        let serper_api_key = std::env::var(&config.serper_api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Self {
            http,
            llm,
            serper_api_key,
            serper_url: config.serper_url.clone(),
            duckduckgo_url: config.duckduckgo_url.clone(),
            max_results: config.max_results,
            context_results: config.context_results,
        }
    }

    pub fn with_serper_key(mut self, key: Option<String>) -> Self {
        self.serper_api_key = key;
        self
    }

    pub async fn search(&self, query: &str, analysis: AnalysisType, user_context: &str) -> String {
        if is_time_query(query) {
            return time_answer(query);
        }

        let analysis = match analysis {
            AnalysisType::Auto => detect_analysis_type(query),
            other => other,
        };

        let results = self.results(query).await;
        if results.is_empty() {
            return NO_RESULTS.into();
        }
        let context = build_context(&results, self.context_results);
        info!(query, ?analysis, results = results.len(), "summarizing search results");

        let (prompt, mode) = match analysis {
            AnalysisType::Comparison => (
                prompts::web_comparison(&context, user_context, &comparison_criteria(query)),
                ResponseMode::DeepThinking,
            ),
            AnalysisType::Learning => (
                prompts::web_learning(&context, user_context, &learning_objective(query)),
                ResponseMode::DeepThinking,
            ),
            AnalysisType::Analysis => (
                prompts::web_analysis(&context, user_context),
                ResponseMode::DeepThinking,
            ),
            AnalysisType::Summary | AnalysisType::Auto => {
                (prompts::web_summary(&context), ResponseMode::Chat)
            }
        };
        self.llm.get_response_with_mode(&prompt, None, mode).await
    }

    /// Raw results; empty when every backend fails.
    pub async fn results(&self, query: &str) -> Vec<SearchResult> {
        if let Some(key) = &self.serper_api_key {
            match self.serper(query, key).await {
                Ok(results) if !results.is_empty() => return results,
                Ok(_) => debug!("serper returned no results, falling back"),
                Err(e) => warn!(error = %e, "Serper.dev search failed"),
            }
        }

        match self.duckduckgo(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "DuckDuckGo search failed");
                Vec::new()
            }
        }
    }

    async fn serper(&self, query: &str, key: &str) -> Result<Vec<SearchResult>> {
        let body = serde_json::to_string(&SerperRequest {
            q: query,
            num: self.max_results,
        })
        .map_err(|e| Error::parse(format!("serialize request: {e}")))?;
        let text = self
            .http
            .post_json_raw(&self.serper_url, &body, &[("X-API-KEY", key)])
            .await?;
        parse_serper(&text)
    }

    async fn duckduckgo(&self, query: &str) -> Result<Vec<SearchResult>> {
        let html = self.http.get_text(&self.duckduckgo_url, &[("q", query)]).await?;
        Ok(parse_duckduckgo(&html, self.max_results))
    }
}

fn parse_serper(text: &str) -> Result<Vec<SearchResult>> {
    let resp: SerperResponse = serde_json::from_str(text)
        .map_err(|e| Error::parse(format!("parse Serper response: {e}")))?;
    let mut results: Vec<SearchResult> = resp
        .organic
        .into_iter()
        .map(|o| SearchResult {
            title: o.title,
            snippet: o.snippet,
            link: o.link,
        })
        .collect();
    if let Some(kg) = resp.knowledge_graph {
        results.insert(
            0,
            SearchResult {
                title: kg.title,
                snippet: kg.description,
                link: kg.link,
            },
        );
    }
    Ok(results)
}

pub fn parse_duckduckgo(html: &str, max_results: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for result in document.select(&result_sel) {
        let Some(anchor) = result.select(&title_sel).next() else {
            continue;
        };
        let title = anchor.text().collect::<String>().trim().to_string();
        let href = anchor.value().attr("href").unwrap_or("");
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        if title.is_empty() || snippet.is_empty() {
            continue;
        }
        results.push(SearchResult {
            title,
            snippet,
            link: resolve_ddg_link(href),
        });
        if results.len() >= max_results {
            break;
        }
    }
    results
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<encoded>`.
fn resolve_ddg_link(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    reqwest::Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

pub fn build_context(results: &[SearchResult], limit: usize) -> String {
    results
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, r)| {
            format!(
                "**Source {}: {}**\n{}\nLink: {}\n",
                i + 1,
                r.title,
                r.snippet,
                r.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn detect_analysis_type(query: &str) -> AnalysisType {
    const COMPARISON: &[&str] = &[
        " vs", "versus", "compare", "comparison", "difference between", "which is better",
        "pros and cons", "advantages disadvantages", "alternatives", "options", "best", "top",
        "ranking", "review",
    ];
    const LEARNING: &[&str] = &[
        "how to", "learn", "tutorial", "guide", "steps", "process", "method", "training",
        "course", "education", "skill", "technique", "what is", "definition", "explain",
        "understand", "basics", "fundamentals",
    ];
    const ANALYSIS: &[&str] = &[
        "analysis", "trend", "market", "industry", "research", "study", "report", "statistics",
        "data", "forecast", "prediction", "future", "impact", "effect", "consequence",
        "strategy", "planning",
    ];

    let q = format!(" {}", query.to_lowercase());
    if COMPARISON.iter().any(|k| q.contains(k)) {
        AnalysisType::Comparison
    } else if LEARNING.iter().any(|k| q.contains(k)) {
        AnalysisType::Learning
    } else if ANALYSIS.iter().any(|k| q.contains(k)) {
        AnalysisType::Analysis
    } else {
        AnalysisType::Summary
    }
}

pub fn comparison_criteria(query: &str) -> String {
    const CRITERIA: &[(&str, &[&str])] = &[
        ("cost", &["price", "cost", "expensive", "cheap", "budget", "affordable"]),
        ("quality", &["quality", "performance", "efficiency", "effectiveness"]),
        ("time", &["speed", "fast", "slow", "duration", "time"]),
        ("features", &["features", "functionality", "capabilities", "tools"]),
        ("reliability", &["reliable", "stable", "dependable", "trustworthy"]),
        ("support", &["support", "customer service", "help", "documentation"]),
    ];

    let q = query.to_lowercase();
    let found: Vec<&str> = CRITERIA
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| q.contains(k)))
        .map(|(name, _)| *name)
        .collect();
    if found.is_empty() {
        "Compare across: cost, quality, features, and user experience".into()
    } else {
        format!("Focus on: {}", found.join(", "))
    }
}

pub fn learning_objective(query: &str) -> String {
    const PATTERNS: &[&str] = &[
        r"(?i)learn (?:how to )?([^.?]+)",
        r"(?i)understand ([^.?]+)",
        r"(?i)guide (?:to|for) ([^.?]+)",
        r"(?i)tutorial (?:on|for) ([^.?]+)",
        r"(?i)steps (?:to|for) ([^.?]+)",
    ];
    for pattern in PATTERNS {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        if let Ok(Some(caps)) = re.captures(query) {
            if let Some(m) = caps.get(1) {
                return m.as_str().trim().to_string();
            }
        }
    }
    query.to_string()
}

pub fn is_time_query(query: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "current time", "what time", "time in", "timezone", "what day", "what date",
        "current date", "today's date", "current moment", "local time", "time right now",
        "what is the time", "what is the date",
    ];
    let q = query.to_lowercase();
    KEYWORDS.iter().any(|k| q.contains(k))
}

fn time_answer(query: &str) -> String {
    let (zone, label) = time::location_in(query);
    let info = time::current_time(zone);
    format!(
        "**Current Time Information**\n\nThe current time in {label} is **{} {}** on **{}**.",
        info.time, info.timezone_abbr, info.date
    )
}
