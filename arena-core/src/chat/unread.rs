/// Messages received while the chat panel is closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadCounter {
    count: usize,
    open: bool,
}

impl UnreadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(&mut self) {
        if !self.open {
            self.count += 1;
        }
    }

    /// Opening the panel marks everything read
    pub fn open(&mut self) {
        self.open = true;
        self.count = 0;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Badge text, capped at `9+`; `None` when nothing is unread
    pub fn badge(&self) -> Option<String> {
        match self.count {
            0 => None,
            n if n > 9 => Some("9+".to_string()),
            n => Some(n.to_string()),
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}
