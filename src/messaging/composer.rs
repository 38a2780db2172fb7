/// Text input of the message composer.
#[derive(Debug, Default, Clone)]
pub struct Composer {
    input: String,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn is_blank(&self) -> bool {
        self.input.trim().is_empty()
    }

    /// Take the trimmed text for sending, leaving the input empty.
    /// Blank input is left untouched and yields `None`.
    pub fn take_for_send(&mut self) -> Option<String> {
        let content = self.input.trim();
        if content.is_empty() {
            return None;
        }
        let content = content.to_string();
        self.input.clear();
        Some(content)
    }

    /// Put back the text of a failed send.
    pub fn restore(&mut self, text: String) {
        self.input = text;
    }

    pub fn clear(&mut self) {
        self.input.clear();
    }
}
