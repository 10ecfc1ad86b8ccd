//! Selector profiles: per-site ordered candidate selectors for the roles
//! an adapter needs to locate (input area, send button, chat container,
//! last message). Order expresses preference — the first selector whose
//! element is both visible and enabled wins.

/// Ordered candidate selectors for one role
pub type SelectorList = Vec<String>;

/// Per-site selector profile
#[derive(Debug, Clone, Default)]
pub struct SelectorProfile {
    pub input_area: SelectorList,
    pub send_button: SelectorList,
    pub chat_container: SelectorList,
    pub last_message: SelectorList,
}

impl SelectorProfile {
    pub fn new(
        input_area: Vec<&str>,
        send_button: Vec<&str>,
        chat_container: Vec<&str>,
        last_message: Vec<&str>,
    ) -> Self {
        Self {
            input_area: input_area.into_iter().map(String::from).collect(),
            send_button: send_button.into_iter().map(String::from).collect(),
            chat_container: chat_container.into_iter().map(String::from).collect(),
            last_message: last_message.into_iter().map(String::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_construction_preserves_order() {
        let profile = SelectorProfile::new(
            vec!["#a", "#b"],
            vec!["#send"],
            vec!["#chat"],
            vec!["#last"],
        );
        assert_eq!(profile.input_area, vec!["#a".to_string(), "#b".to_string()]);
        assert_eq!(profile.send_button, vec!["#send".to_string()]);
    }
}
