// System prompts for every completion call. The email text itself always travels as
// the user message, never spliced into these.

use crate::llm_client::tone::Tone;

/// Rewrite prompt template. Replace `{tone}` before sending.
const REWRITE_SYSTEM_TEMPLATE: &str = "You are an expert email writer. \
    Rewrite the given email so that it reads {tone}. \
    Keep the core message intact but improve the tone, grammar, and clarity. \
    Return only the rewritten email.";

pub const ROAST_SYSTEM: &str = "You are a witty email critic. \
    Roast this email in a funny but not mean-spirited way. \
    Point out awkward phrasing, unclear messages, or funny quirks. \
    Keep it light-hearted and constructive. \
    Return only the roast.";

pub fn rewrite_system(tone: Tone) -> String {
    REWRITE_SYSTEM_TEMPLATE.replace("{tone}", tone.instruction())
}
