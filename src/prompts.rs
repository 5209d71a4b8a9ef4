//! Prompt composition: the system instruction and the per-turn prompt.
//!
//! Every prompt lives here so the behavioural contract can be inspected by
//! unit tests without a model:
//!
//! 1. [`system_instruction`] — persona, source priority, the "contact
//!    service" override, language rules, the six-section response schema,
//!    the greeting short-circuit and the escalation rules, followed by the
//!    manual text inside the reference block.
//! 2. [`compose_turn_prompt`] — the prior transcript replayed as labelled
//!    lines, the current input, and the steering instruction.
//!
//! The model keeps no state between calls; everything it needs is re-sent.

use crate::manual::ManualDocument;
use crate::transcript::{Role, Turn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;

/// Placed in the reference block when no manual has been uploaded.
pub const NO_MANUAL_PLACEHOLDER: &str = "No manual provided.";

pub const REFERENCE_START: &str = "[REFERENCE SOURCE START]";
pub const REFERENCE_END: &str = "[REFERENCE SOURCE END]";

/// Response languages the protocol spells out headers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Turkish,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::English, Language::Turkish];

    pub fn name(self) -> &'static str {
        match self {
            Language::English => "ENGLISH",
            Language::Turkish => "TURKISH",
        }
    }

    /// The six section headers, in schema order: source, safety, diagnosis,
    /// tools, instructions, verification.
    pub fn headers(self) -> [&'static str; 6] {
        match self {
            Language::English => [
                "📚 SOURCE INFO",
                "🚨 SAFETY FIRST",
                "🔍 DIAGNOSIS / POSSIBLE CAUSE",
                "🛠️ TOOLS REQUIRED",
                "📋 STEP-BY-STEP REPAIR INSTRUCTIONS",
                "✅ VERIFICATION",
            ],
            Language::Turkish => [
                "📚 KAYNAK BİLGİSİ (veya ⚠️ GENEL BİLGİ)",
                "🚨 ÖNCE GÜVENLİK",
                "🔍 TEŞHİS / MUHTEMEL SEBEP",
                "🛠️ GEREKLİ ALETLER",
                "📋 ADIM ADIM ONARIM TALİMATLARI",
                "✅ KONTROL / SAĞLAMA",
            ],
        }
    }
}

const PERSONA: &str = r#"Role: You are a Senior Field Service Engineer with 20 years of experience. You are assisting a junior technician currently on-site fixing a machine.

CONTEXT:
You have access to the official maintenance manual provided below under [REFERENCE SOURCE].

OBJECTIVE:
Solve the technician's problem.
**PRIORITY 1:** Use the [REFERENCE SOURCE] (Official Manual).
**PRIORITY 2:** If the manual does not cover the issue OR the user explicitly asks for an alternative/general solution, use your **General Engineering Knowledge**."#;

const CONTACT_SERVICE_OVERRIDE: &str = r#"--- "CONTACT SERVICE" OVERRIDE PROTOCOL (CRITICAL) ---
The user IS the technician. Therefore:
* IF the manual says "Contact Authorized Service" or "Call a Technician":
* **DO NOT** tell the user to call support.
* **INSTEAD**, assume the role of the expert and provide the actual repair/replacement steps using your **General Engineering Knowledge**.
* Mark the source as **⚠️ GENERAL KNOWLEDGE** since the manual withheld the technical steps."#;

const FALLBACK: &str = r#"--- FALLBACK PROTOCOL ---
* **SCENARIO A (Found in Manual):** If the solution is explicitly in the PDF.
    * Start response with: "**📚 SOURCE: OFFICIAL MANUAL**" (or Turkish equivalent).
* **SCENARIO B (Not in Manual / "Call Service" Case):** If the solution is NOT in the PDF or the PDF says "Call Service".
    * Start response with: "**⚠️ SOURCE: GENERAL ENGINEERING KNOWLEDGE**" (or Turkish equivalent).
    * Add a disclaimer: "The manual directs to service. As you are the technician, here are the standard industry steps.""#;

const RESPONSE_LOGIC: &str = r#"--- RESPONSE LOGIC ---
TYPE A: GREETINGS / SMALL TALK -> Professional brief reply. Do NOT use the six-section format.
TYPE B: TECHNICAL INQUIRY -> Use the STRICT FORMAT below.

--- STRICT RESPONSE FORMAT ---
Use Markdown headers (###) for structure.

### [CORRECT SOURCE HEADER]
State clearly if this is from the Manual or General Knowledge.

### [CORRECT SAFETY HEADER]
Identify risks (Electric shock, etc.).

### [CORRECT DIAGNOSIS HEADER]
State the likely cause.

### [CORRECT TOOLS HEADER]
List tools.

### [CORRECT INSTRUCTIONS HEADER]
* Provide repair steps (either from manual or general expertise).
* If from manual, cite pages.
* Use bullet points for steps.

### [CORRECT VERIFICATION HEADER]
How to confirm the fix."#;

const ESCALATION: &str = r#"--- ITERATIVE TROUBLESHOOTING LOGIC ---
If user says "It didn't work" or "problem persists":
1.  **ACKNOWLEDGE:** Briefly state "Understood, the basic steps failed."
2.  **ESCALATE:** Do NOT repeat. Provide ADVANCED steps.
3.  **SWITCH SOURCE:** Force switch to **⚠️ GENERAL KNOWLEDGE**."#;

/// Built-in behavioural protocol, without the reference block.
pub fn default_protocol() -> String {
    let mut out = String::new();
    out.push_str(PERSONA);
    out.push_str("\n\n");
    out.push_str(CONTACT_SERVICE_OVERRIDE);
    out.push_str("\n\n");
    out.push_str(FALLBACK);
    out.push_str("\n\n");
    out.push_str(&language_rules());
    out.push_str("\n\n");
    out.push_str(RESPONSE_LOGIC);
    out.push_str("\n\n");
    out.push_str(ESCALATION);
    out
}

fn language_rules() -> String {
    let mut out = String::from(
        "--- LANGUAGE & HEADER RULES ---\n\
         1.  **Detect Language:** Reply in the language the user writes in. \
         If User input is Turkish -> Response MUST be Turkish. \
         If User input is English -> Response MUST be English.\n\
         2.  **Translate Headers (USE MARKDOWN ###):**\n",
    );
    for lang in Language::ALL {
        let _ = writeln!(out, "\n    * **IF {}:**", lang.name());
        for (i, header) in lang.headers().iter().enumerate() {
            let _ = writeln!(out, "        {}. **### {}**", i + 1, header);
        }
    }
    out.truncate(out.trim_end().len());
    out
}

/// Build the system instruction bound to a model session.
///
/// `protocol` replaces the built-in protocol when given. The reference block
/// always carries either the manual text or [`NO_MANUAL_PLACEHOLDER`].
pub fn system_instruction(manual: Option<&ManualDocument>, protocol: Option<&str>) -> String {
    let reference = manual
        .map(|m| m.text.as_str())
        .filter(|text| !text.trim().is_empty())
        .unwrap_or(NO_MANUAL_PLACEHOLDER);

    let protocol = match protocol {
        Some(custom) => custom.trim_end().to_string(),
        None => default_protocol(),
    };

    format!("{protocol}\n\n{REFERENCE_START}\n{reference}\n{REFERENCE_END}\n")
}

/// Steering instruction appended to every per-turn prompt.
pub const TURN_INSTRUCTION: &str = r#"INSTRUCTION:
Review the history.
If the user says "problem persists" or "didn't work", DO NOT repeat previous advice. Provide the NEXT logical troubleshooting step.
**DO NOT repeat the conversation history in your response.** Just provide the answer."#;

/// Added when the technician reports that earlier advice failed.
pub const ESCALATION_NOTE: &str = r#"ESCALATION:
The technician reports that the previously suggested fix did not solve the problem.
Acknowledge the failure, do not repeat any earlier step, switch the source to ⚠️ GENERAL KNOWLEDGE and give a more advanced next step."#;

static ESCALATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:didn'?t work|did not work|doesn'?t work|does not work|still (?:not|broken|failing|the same)|problem persists|issue persists|same (?:problem|error)|işe yaramadı|çalışmadı|(?:yine|gene) olmadı|sorun devam|(?:hala|hâlâ) (?:aynı|çalışmıyor|devam))\b",
    )
    .expect("valid escalation regex")
});

/// Whether `input` reports that a previous fix failed.
pub fn is_escalation(input: &str) -> bool {
    ESCALATION_RE.is_match(input)
}

/// The turns that precede `current`.
///
/// If the caller already appended `current` as the last user turn, that
/// entry is left out so the input is not sent twice.
pub fn prior_turns<'a>(transcript: &'a [Turn], current: &str) -> &'a [Turn] {
    match transcript.split_last() {
        Some((last, rest)) if last.role == Role::User && last.text == current => rest,
        _ => transcript,
    }
}

/// Serialise turns as `"<ROLE LABEL>: <text>"` lines in order.
pub fn history_text(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        let _ = writeln!(out, "{}: {}", turn.role.prompt_label(), turn.text);
    }
    out
}

/// Build the full prompt for one technician message.
pub fn compose_turn_prompt(transcript: &[Turn], current: &str) -> String {
    let prior = prior_turns(transcript, current);
    let mut out = String::new();

    out.push_str("PREVIOUS CONVERSATION HISTORY:\n");
    out.push_str(&history_text(prior));
    out.push('\n');

    out.push_str("CURRENT USER INPUT:\n");
    out.push_str(current);
    out.push_str("\n\n");

    let answered_before = prior.iter().any(|t| t.role == Role::Assistant);
    if answered_before && is_escalation(current) {
        out.push_str(ESCALATION_NOTE);
        out.push_str("\n\n");
    }

    out.push_str(TURN_INSTRUCTION);
    out.push('\n');
    out
}
