//! UI-agnostic conversation state
//!
//! The transcript and progress types are shared by every front end and
//! don't depend on any specific UI framework.

use serde::{Deserialize, Serialize};

/// A single entry in the chat transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub origin: Origin,
    pub text: Option<String>,
    pub image_ref: Option<String>,
    pub step_index: Option<u32>,
}

/// Who produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    User,
    Assistant,
}

impl DisplayMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::User,
            text: Some(text.into()),
            image_ref: None,
            step_index: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::Assistant,
            text: Some(text.into()),
            image_ref: None,
            step_index: None,
        }
    }

    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    pub fn with_step(mut self, step_index: Option<u32>) -> Self {
        self.step_index = step_index;
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.origin == Origin::Assistant
    }
}

/// Progress through the active guided flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub flow_title: Option<String>,
    pub current_step: u32,
    pub total_steps: u32,
}

impl ProgressState {
    /// Completion percentage, counting the current step as done
    pub fn percentage(&self) -> u8 {
        if self.total_steps == 0 {
            return 0;
        }
        let pct = (f64::from(self.current_step) + 1.0) / f64::from(self.total_steps) * 100.0;
        pct.round().clamp(0.0, 100.0) as u8
    }

    pub fn has_flow(&self) -> bool {
        self.total_steps > 0
    }

    pub fn set_total(&mut self, total: u32) {
        self.total_steps = total;
        self.current_step = self.clamp_step(self.current_step);
    }

    pub fn set_step(&mut self, step: u32) {
        self.current_step = self.clamp_step(step);
    }

    /// Keep `current_step < total_steps` whenever a total is known
    fn clamp_step(&self, step: u32) -> u32 {
        if self.total_steps > 0 {
            step.min(self.total_steps - 1)
        } else {
            step
        }
    }
}
