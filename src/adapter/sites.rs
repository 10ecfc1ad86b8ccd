//! Built-in site adapters.

use super::{AdapterIdentity, FixedDelayWaiter, ResponseWaiter, SiteAdapter};
use crate::selectors::SelectorProfile;
use std::sync::Arc;

fn adapter(
    website_id: &str,
    display_name: &str,
    home_url: &str,
    url_hosts: &[&str],
    selectors: SelectorProfile,
) -> Arc<SiteAdapter> {
    Arc::new(SiteAdapter {
        identity: AdapterIdentity {
            website_id: website_id.to_string(),
            display_name: display_name.to_string(),
            home_url: home_url.to_string(),
            requires_proxy: false,
        },
        selectors,
        url_hosts: url_hosts.iter().map(|s| s.to_string()).collect(),
        response_waiter: Arc::new(FixedDelayWaiter) as Arc<dyn ResponseWaiter>,
    })
}

pub fn chatgpt() -> Arc<SiteAdapter> {
    adapter(
        "chatgpt",
        "ChatGPT",
        "https://chat.openai.com",
        &["chat.openai.com", "chatgpt.com"],
        SelectorProfile::new(
            vec!["#prompt-textarea", "textarea[data-id]", "div[contenteditable='true']"],
            vec!["button[data-testid='send-button']", "button[aria-label='Send prompt']"],
            vec!["main", "div.conversation"],
            vec!["div[data-message-author-role='assistant']:last-of-type"],
        ),
    )
}

pub fn claude() -> Arc<SiteAdapter> {
    adapter(
        "claude",
        "Claude",
        "https://claude.ai",
        &["claude.ai"],
        SelectorProfile::new(
            vec!["div[contenteditable='true'][translate='no']", "div.ProseMirror"],
            vec!["button[aria-label='Send Message']"],
            vec!["div.conversation-container"],
            vec!["div[data-testid='message']:last-of-type"],
        ),
    )
}

pub fn gemini() -> Arc<SiteAdapter> {
    adapter(
        "gemini",
        "Gemini",
        "https://gemini.google.com",
        &["gemini.google.com"],
        SelectorProfile::new(
            vec!["rich-textarea div[contenteditable='true']"],
            vec!["button[aria-label='Send message']"],
            vec!["div.conversation-container"],
            vec!["message-content:last-of-type"],
        ),
    )
}

/// Named explicitly in spec scenario S5 (adapter fallback by URL).
pub fn deepseek() -> Arc<SiteAdapter> {
    adapter(
        "deepseek",
        "DeepSeek",
        "https://chat.deepseek.com",
        &["deepseek.com"],
        SelectorProfile::new(
            vec!["#chat-input", "textarea.chat-input"],
            vec!["div.send-button", "button[aria-label='Send']"],
            vec!["div.chat-container"],
            vec!["div.message.assistant:last-of-type"],
        ),
    )
}

/// The adapters wired in by default.
pub fn builtin() -> Vec<Arc<SiteAdapter>> {
    vec![chatgpt(), claude(), gemini(), deepseek()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deepseek_matches_chat_subdomain() {
        let adapter = deepseek();
        assert!(adapter.url_matcher("https://chat.deepseek.com/x"));
    }

    #[test]
    fn test_builtin_has_four_adapters() {
        assert_eq!(builtin().len(), 4);
    }
}
