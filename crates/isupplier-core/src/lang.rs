use serde::{Deserialize, Serialize};

/// The two languages the assistant speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Lang {
    #[default]
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "FR")]
    Fr,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::En => "EN",
            Lang::Fr => "FR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EN" => Some(Lang::En),
            "FR" => Some(Lang::Fr),
            _ => None,
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Lang::En => Lang::Fr,
            Lang::Fr => Lang::En,
        }
    }

    /// Pick the string for this language
    pub fn pick<'a>(&self, en: &'a str, fr: &'a str) -> &'a str {
        match self {
            Lang::En => en,
            Lang::Fr => fr,
        }
    }

    /// BCP 47 tag handed to speech recognizers
    pub fn speech_tag(&self) -> &'static str {
        match self {
            Lang::En => "en-US",
            Lang::Fr => "fr-FR",
        }
    }
}
