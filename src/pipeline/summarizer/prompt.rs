//! Prompts for the ranked summary mode.

/// System prompt for the structured breakdown.
pub const BREAKDOWN_SYSTEM_PROMPT: &str = "You are a civic operations analyst. \
You summarize citizen-submitted issue reports for city officials. \
Use only the reports provided. Do not invent numbers, places or issues.";

/// System prompt for the public abstract.
pub const ABSTRACT_SYSTEM_PROMPT: &str = "You write short public updates about civic issues. \
Reply with a single sentence and nothing else: no quotes, no hashtags, no emojis.";

/// Section headings of the structured breakdown, in order.
pub const BREAKDOWN_SECTIONS: [&str; 6] = [
    "Total reports",
    "Reports per category",
    "Top flagged issues",
    "Resolved issues",
    "High-priority areas",
    "Short summary",
];

/// Prompt asking for the six-section breakdown of a ranked digest.
pub fn build_breakdown_prompt(digest: &str, period_label: &str, total_reports: usize) -> String {
    let sections = BREAKDOWN_SECTIONS
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Below are {total_reports} civic-issue reports submitted in the {period_label}, \
         most-flagged first. Each line is: index. [category] description (status) location.\n\n\
         {digest}\n\n\
         Write a report with exactly these six numbered sections:\n{sections}\n\n\
         Keep each section brief. Under \"Resolved issues\" list only reports whose status is Resolved."
    )
}

/// Prompt asking for a one-sentence public abstract within `max_chars`.
pub fn build_abstract_prompt(digest: &str, period_label: &str, max_chars: usize) -> String {
    format!(
        "Reports from the {period_label}:\n{digest}\n\n\
         Write ONE sentence of at most {max_chars} characters following this template:\n\
         \"In the {period_label}, residents reported <N> issues, mostly <top categories>; \
         top concern: <most flagged issue and place>.\"\n\
         Stay under {max_chars} characters."
    )
}
