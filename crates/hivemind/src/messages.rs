use std::collections::BTreeMap;
use std::fmt::Display;

/// Локализуемые сообщения модуля
#[derive(Debug, Clone, Default)]
pub struct ModuleMessages {
    module_id: String,
    messages: BTreeMap<String, String>,
}

impl ModuleMessages {
    pub fn new(module_id: impl Into<String>, messages: BTreeMap<String, String>) -> Self {
        Self {
            module_id: module_id.into(),
            messages,
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn contains(&self, key: &str) -> bool {
        self.messages.contains_key(key)
    }

    /// Текст сообщения; отсутствующий ключ превращается в `[KEY]`
    pub fn get_message(&self, key: &str) -> String {
        match self.messages.get(key) {
            Some(text) => text.clone(),
            None => format!("[{}]", key.to_uppercase()),
        }
    }

    /// Подставить аргументы вместо `{0}`, `{1}`, ...
    pub fn format(&self, key: &str, args: &[&dyn Display]) -> String {
        let mut text = self.get_message(key);
        for (index, arg) in args.iter().enumerate() {
            text = text.replace(&format!("{{{}}}", index), &arg.to_string());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> ModuleMessages {
        let mut map = BTreeMap::new();
        map.insert("greeting".to_string(), "Hello, {0}! You have {1} messages.".to_string());
        ModuleMessages::new("hivemind.test", map)
    }

    #[test]
    fn test_format_substitutes_positional_arguments() {
        let text = messages().format("greeting", &[&"Wilma", &3]);
        assert_eq!(text, "Hello, Wilma! You have 3 messages.");
    }

    #[test]
    fn test_missing_key_is_bracketed() {
        let messages = messages();
        assert_eq!(messages.get_message("farewell"), "[FAREWELL]");
        assert_eq!(messages.format("farewell", &[&1]), "[FAREWELL]");
        assert!(!messages.contains("farewell"));
    }
}
