//! Generation prompt assembly and SQL extraction.

use crate::dialect::DatabaseContext;
use crate::llm::ChatMessage;
use crate::retrieval::RetrievedContext;

/// Character budget for the system prompt (roughly 14k tokens).
pub const PROMPT_CHAR_BUDGET: usize = 56_000;

const RESPONSE_GUIDELINES: &str = "===Response Guidelines \n\
1. If the provided context is sufficient, generate a valid SQL query without any explanations for the question.\n\
2. If the provided context is insufficient, explain why it can't be generated.\n\
3. Use the most relevant table(s).\n\
4. If the question has been asked and answered before, repeat the answer exactly as it was given before.\n\
5. Ensure that the output SQL is dialect-compliant and executable, and free of syntax errors.\n";

/// System prompt plus chat history ready for the completion provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPrompt {
    pub system: String,
    pub history: Vec<ChatMessage>,
}

pub fn build_prompt(
    question: &str,
    context: &DatabaseContext,
    temporal_rules: &str,
    retrieved: &RetrievedContext,
) -> GenerationPrompt {
    let mut system = context.system_prompt(temporal_rules);

    let ddl: Vec<&str> = retrieved.ddl.iter().map(|h| h.record.content.as_str()).collect();
    append_section(&mut system, "\n\n===Tables \n", &ddl);

    let docs: Vec<&str> = retrieved
        .documentation
        .iter()
        .map(|h| h.record.content.as_str())
        .collect();
    append_section(&mut system, "\n\n===Additional Context \n\n", &docs);

    system.push_str("\n\n");
    system.push_str(RESPONSE_GUIDELINES);

    let mut history = Vec::new();
    for hit in &retrieved.question_sql {
        if let Some(q) = &hit.record.question {
            history.push(ChatMessage::user(q.clone()));
            history.push(ChatMessage::assistant(hit.record.content.clone()));
        }
    }
    history.push(ChatMessage::user(question));

    GenerationPrompt { system, history }
}

/// Append items under `header` while the prompt stays within budget.
fn append_section(prompt: &mut String, header: &str, items: &[&str]) {
    if items.is_empty() {
        return;
    }
    prompt.push_str(header);
    for item in items {
        if prompt.len() + item.len() + 2 > PROMPT_CHAR_BUDGET {
            break;
        }
        prompt.push_str(item);
        prompt.push_str("\n\n");
    }
}

/// Pull the SQL statement out of a completion.
///
/// Tries a fenced code block, then a `WITH`/`SELECT` statement ending at `;`,
/// then everything from the first `SELECT`; falls back to the trimmed text.
pub fn extract_sql(response: &str) -> String {
    if let Some(block) = fenced_block(response) {
        return block.trim().to_string();
    }

    let upper = response.to_ascii_uppercase();
    for keyword in ["WITH", "SELECT"] {
        if let Some(start) = find_word(&upper, keyword) {
            if let Some(end) = response[start..].find(';') {
                return response[start..start + end + 1].trim().to_string();
            }
        }
    }
    if let Some(start) = find_word(&upper, "SELECT") {
        return response[start..].trim().to_string();
    }
    response.trim().to_string()
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let header = &after[..body_start];
    if !header.trim().is_empty() && !header.trim().eq_ignore_ascii_case("sql") {
        return None;
    }
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// Byte offset of `word` as a whole word in `haystack` (already uppercased).
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(word) {
        let start = from + pos;
        let end = start + word.len();
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return Some(start);
        }
        from = end;
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// True if the statement starts with `SELECT` or `WITH` once comments and
/// leading parentheses are removed.
pub fn is_select_statement(sql: &str) -> bool {
    let stripped = strip_comments(sql);
    let head = stripped.trim_start().trim_start_matches(|c: char| c == '(' || c.is_whitespace());
    let first: String = head
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();
    first == "SELECT" || first == "WITH"
}

fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    loop {
        let next = [rest.find("--").map(|i| (i, false)), rest.find("/*").map(|i| (i, true))]
            .into_iter()
            .flatten()
            .min_by_key(|(i, _)| *i);
        match next {
            None => {
                out.push_str(rest);
                return out;
            }
            Some((start, false)) => {
                out.push_str(&rest[..start]);
                rest = match rest[start..].find('\n') {
                    Some(nl) => &rest[start + nl..],
                    None => "",
                };
            }
            Some((start, true)) => {
                out.push_str(&rest[..start]);
                out.push(' ');
                rest = match rest[start + 2..].find("*/") {
                    Some(close) => &rest[start + 2 + close + 2..],
                    None => "",
                };
            }
        }
    }
}
