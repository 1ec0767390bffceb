use toggle_core::{Display, Indicator, ToggleState};

/// Prints every display update as one line on stdout.
pub struct TerminalDisplay {
    label: String,
}

impl TerminalDisplay {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Display for TerminalDisplay {
    fn set_state(&self, state: ToggleState) {
        println!("[{}] state: {}", self.label, state);
    }

    fn set_indicator(&self, indicator: &Indicator) {
        match indicator {
            Indicator::Clear => println!("[{}] indicator cleared", self.label),
            other => println!("[{}] indicator: {}", self.label, other),
        }
    }
}
