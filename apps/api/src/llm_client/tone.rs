//! Tone selection: maps the requested tone label to the instruction the model receives.
//!
//! Unrecognized labels never fail a request; they fall back to `Professional`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Polite,
    Funny,
    Direct,
    Karen,
    Professional,
}

impl Tone {
    /// Case-insensitive; anything unrecognized is `Professional`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "polite" => Tone::Polite,
            "funny" => Tone::Funny,
            "direct" => Tone::Direct,
            "karen" => Tone::Karen,
            _ => Tone::Professional,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tone::Polite => "Polite",
            Tone::Funny => "Funny",
            Tone::Direct => "Direct",
            Tone::Karen => "Karen",
            Tone::Professional => "Professional",
        }
    }

    /// The natural-language instruction spliced into the rewrite system prompt.
    pub fn instruction(&self) -> &'static str {
        match self {
            Tone::Polite => "professional, courteous, and respectful",
            Tone::Funny => "funny, adding appropriate humor while staying professional",
            Tone::Direct => "direct and straight to the point, with no fluff",
            Tone::Karen => "demanding, entitled, and dramatic (for fun)",
            Tone::Professional => "clear and professional",
        }
    }
}
