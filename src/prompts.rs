//! Prompt templates shared by the router, tools and calendar agent.

use crate::memory::{ChatMessage, Role};

const ASSISTANT_GUIDELINES: &str = "You are a helpful, intelligent AI assistant that provides clear, well-structured, and actionable responses. Always aim to be:
- Direct and relevant
- Well-organized with clear sections
- Specific with concrete examples
- Professional yet friendly
- Helpful and actionable";

const DEEP_THINKING_PREAMBLE: &str = "Think through this request carefully before answering. Work through it in stages:
1. Context & Background: What is the broader context?
2. Core Components: What are the fundamental elements and how do they relate?
3. Evidence: Which facts in the material support each point?
4. Implications: What follows from the evidence, and for whom?
5. Recommendations: What should the reader do with this?

Present only the final, organized answer with clear headings.";

pub fn system(persona_name: &str, personality: &str, current_time: &str) -> String {
    format!(
        "You are {persona_name}, {personality}.\n\n{ASSISTANT_GUIDELINES}\n\n**CURRENT TIME:** {current_time}\n"
    )
}

pub fn conversation(
    system: &str,
    history: &[ChatMessage],
    file_content: Option<&str>,
    message: &str,
) -> String {
    let mut prompt = format!("{system}\n");

    if let Some(content) = file_content {
        prompt.push_str(&format!(
            "IMPORTANT: The user has uploaded a file with the following content:
{content}

When the user asks questions about this content, provide a comprehensive analysis that:
- Directly answers their specific question
- Uses bullet points or structured format for clarity
- Highlights the most relevant details
- Is specific and quantitative when possible
- Organizes information logically

"
        ));
    }

    if !history.is_empty() {
        prompt.push_str("Recent conversation context:\n");
        for msg in history {
            let role = match msg.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{role}: {}\n", msg.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User: {message}\nAssistant:"));
    prompt
}

pub fn file_analysis(system: &str, file_name: &str, content: &str, question: &str) -> String {
    format!(
        "{system}
The user has uploaded a file named '{file_name}' with the following content:
{content}

The user is asking: \"{question}\"

Please provide a comprehensive, well-structured analysis that directly answers their question.

**Guidelines:**
- Focus specifically on what they're asking about
- Provide clear, actionable insights
- Use bullet points or structured format for better readability
- Be specific and quantitative when possible
- Keep the response focused and professional

Your analysis:"
    )
}

pub fn meeting_insights(meeting_context: &str) -> String {
    format!(
        "Analyze this meeting and provide 2-3 brief, actionable insights:

{meeting_context}
Provide insights about:
1. Meeting type and purpose
2. Key preparation points
3. Potential talking points or questions

Keep each insight to 1-2 sentences. Be specific and actionable."
    )
}

pub fn summarization(text: &str) -> String {
    format!(
        "Summarize the following text in a concise, actionable way for productivity:\n\n{text}\n\nSummary:"
    )
}

pub fn web_summary(results: &str) -> String {
    format!(
        "You are a research assistant. Summarize the following web results for the user. Include hyperlinks in markdown.

Web results:
{results}

Summary:"
    )
}

pub fn web_analysis(results: &str, user_context: &str) -> String {
    format!(
        "You are a research analyst. Using the web results below, produce a detailed analysis covering context, key trends, drivers, implications and outlook. Cite sources with markdown links.
{}
Web results:
{results}

Analysis:",
        context_line(user_context)
    )
}

pub fn web_comparison(results: &str, user_context: &str, criteria: &str) -> String {
    format!(
        "You are a comparison specialist. Using the web results below, compare the options the user is asking about. {criteria}. Present a side-by-side comparison, the strengths and weaknesses of each, and a recommendation. Cite sources with markdown links.
{}
Web results:
{results}

Comparison:",
        context_line(user_context)
    )
}

pub fn web_learning(results: &str, user_context: &str, objective: &str) -> String {
    format!(
        "You are a learning coach. The user wants to learn: {objective}. Using the web results below, build a step-by-step learning guide with prerequisites, core concepts, practice steps and the best resources (as markdown links).
{}
Web results:
{results}

Learning guide:",
        context_line(user_context)
    )
}

pub fn deep_thinking(prompt: &str) -> String {
    format!("{DEEP_THINKING_PREAMBLE}\n\n{prompt}")
}

fn context_line(user_context: &str) -> String {
    if user_context.is_empty() {
        String::new()
    } else {
        format!("User context: {user_context}\n")
    }
}
