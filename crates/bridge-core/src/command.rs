use once_cell::sync::Lazy;
use regex::Regex;

use crate::registry::ProjectRegistry;

/// What an inbound message asks the daemon to do. Produced by `classify`
/// from an ordered list of pattern alternatives; dispatched by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Permission-button callback for the external approval mechanism.
    Permission {
        decision: PermissionDecision,
        request_id: String,
    },
    /// Tear down and relaunch the active session.
    Restart,
    /// Switch the active project. `name` is the raw token the user typed;
    /// the router resolves it (again) against the registry.
    SwitchProject { name: String },
    /// Produce a listing of registered projects.
    ListProjects,
    /// Toggle the diff-mode flag file.
    DiffMode { enabled: bool },
    /// Voice attachment: fetch, transcribe, forward.
    Voice { file_id: String },
    /// Photo attachment: fetch, persist, reference in the transcript.
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    /// Anything else: plain text for the transcript.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny,
    Always,
}

impl PermissionDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionDecision::Allow => "allow",
            PermissionDecision::Deny => "deny",
            PermissionDecision::Always => "always",
        }
    }
}

static PERM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[btn\] perm_(allow|deny|always)_(perm-\d+)$").unwrap());

static VOICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[voice:(.+)\]$").unwrap());

static PHOTO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[photo:([^|\]]+)(?:\|(.+))?\]$").unwrap());

// `\w` does not match Cyrillic, hence the explicit token class.
const NAME: &str = "[а-яёa-z0-9]+";

/// Natural-language switch phrases. These only classify as a switch when
/// the captured name resolves in the registry; otherwise the message falls
/// through to plain text ("открой холодильник" is not a project switch).
static SWITCH_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(&format!(
            r"(?:переключи(?:сь)?|перейди|открой|давай|запусти|стартуй|включи|go to|switch to|switch)\s+(?:на\s+)?({NAME})"
        ))
        .unwrap(),
        Regex::new(&format!(r"(?:на\s+)({NAME})\s+(?:переключи|перейди|давай)")).unwrap(),
        Regex::new(&format!(r"^project\s+({NAME})$")).unwrap(),
    ]
});

/// The explicit slash form is always a switch command, so an unknown name
/// gets reported with the available projects instead of reaching the
/// transcript.
static SLASH_PROJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^/project\s+({NAME})$")).unwrap());

static LIST_RES: Lazy<Vec<Regex>> =
    Lazy::new(|| vec![Regex::new("какие проекты").unwrap(), Regex::new("список проектов").unwrap()]);

impl Command {
    /// Classify a message, evaluating the alternatives in dispatch order.
    pub fn classify(text: &str, registry: &ProjectRegistry) -> Command {
        let raw = text.trim();
        let lower = raw.to_lowercase();

        if let Some(caps) = PERM_RE.captures(raw) {
            let decision = match &caps[1] {
                "allow" => PermissionDecision::Allow,
                "deny" => PermissionDecision::Deny,
                _ => PermissionDecision::Always,
            };
            return Command::Permission {
                decision,
                request_id: caps[2].to_string(),
            };
        }

        if lower == "restart claude" || lower == "/restart" {
            return Command::Restart;
        }

        if let Some(caps) = SLASH_PROJECT_RE.captures(&lower) {
            return Command::SwitchProject {
                name: caps[1].to_string(),
            };
        }
        for re in SWITCH_RES.iter() {
            if let Some(caps) = re.captures(&lower) {
                let name = &caps[1];
                if registry.resolve(name).is_some() {
                    return Command::SwitchProject {
                        name: name.to_string(),
                    };
                }
            }
        }

        if lower == "/project"
            || lower == "/projects"
            || lower == "projects"
            || LIST_RES.iter().any(|re| re.is_match(&lower))
        {
            return Command::ListProjects;
        }

        if lower == "diffs on" {
            return Command::DiffMode { enabled: true };
        }
        if lower == "diffs off" {
            return Command::DiffMode { enabled: false };
        }

        if let Some(caps) = VOICE_RE.captures(raw) {
            return Command::Voice {
                file_id: caps[1].to_string(),
            };
        }

        if let Some(caps) = PHOTO_RE.captures(raw) {
            return Command::Photo {
                file_id: caps[1].to_string(),
                caption: caps.get(2).map(|m| m.as_str().to_string()),
            };
        }

        Command::Text
    }
}
