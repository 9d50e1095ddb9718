//! System prompt construction

/// Base system prompt establishing the assistant's role
const BASE_PROMPT: &str = r"You are a helpful AI assistant in an ongoing conversation. Answer clearly and concisely.

You have access to tools:
- web_search: search the web for current information
- stock_quote: look up a stock quote by ticker symbol

Use tools when the question needs current facts or market data; otherwise answer directly. When using tools, briefly explain what you're doing.";

/// Build the system prompt for a thread
pub fn build_system_prompt(model_id: &str) -> String {
    format!("{BASE_PROMPT}\n\nYou are running as model {model_id}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_tools_and_model() {
        let prompt = build_system_prompt("gpt-4o-mini");
        assert!(prompt.contains("web_search"));
        assert!(prompt.contains("stock_quote"));
        assert!(prompt.contains("gpt-4o-mini"));
    }
}
