//! Strategy matrix: audience avatars crossed with narrative angles, and the content
//! payloads generated for one avatar/angle cell.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_INTENT: &str = "Raise visibility and historical relevance";

/// Number of avatars and angles asked for; the grid is this many squared.
pub const MATRIX_SIDE: usize = 5;

/// Number of payloads asked for per cell.
pub const PAYLOADS_PER_CELL: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceAvatar {
    pub name: String,
    #[serde(default)]
    pub demographic: String,
    #[serde(default)]
    pub psychographic: String,
    #[serde(default)]
    pub pain_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeAngle {
    pub name: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub narrative_focus: String,
    #[serde(default)]
    pub key_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyMatrix {
    #[serde(default)]
    pub avatars: Vec<AudienceAvatar>,
    #[serde(default)]
    pub angles: Vec<NarrativeAngle>,
}

impl StrategyMatrix {
    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty() || self.angles.is_empty()
    }

    /// The avatar/angle pair at a cell, both indices 0-based.
    pub fn cell(&self, cell: MatrixCell) -> Option<(&AudienceAvatar, &NarrativeAngle)> {
        Some((self.avatars.get(cell.avatar)?, self.angles.get(cell.angle)?))
    }
}

/// Address of one matrix cell. Parsed from `<avatar>:<angle>`, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixCell {
    pub avatar: usize,
    pub angle: usize,
}

impl FromStr for MatrixCell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (avatar, angle) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <avatar>:<angle>, got '{s}'"))?;
        let index = |raw: &str| match raw.trim().parse::<usize>() {
            Ok(n) if n >= 1 => Ok(n - 1),
            _ => Err(format!("'{raw}' is not a 1-based index")),
        };
        Ok(Self {
            avatar: index(avatar)?,
            angle: index(angle)?,
        })
    }
}

impl fmt::Display for MatrixCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.avatar + 1, self.angle + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadFormat {
    Reel,
    Carousel,
    Thread,
    Story,
}

impl PayloadFormat {
    pub const ALL: [PayloadFormat; 4] = [
        PayloadFormat::Reel,
        PayloadFormat::Carousel,
        PayloadFormat::Thread,
        PayloadFormat::Story,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PayloadFormat::Reel => "Reel",
            PayloadFormat::Carousel => "Carousel",
            PayloadFormat::Thread => "Thread",
            PayloadFormat::Story => "Story",
        }
    }
}

/// One piece of content for an avatar/angle cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViralPayload {
    /// First three seconds of text or audio.
    pub hook: String,
    /// Psychological trigger the piece relies on.
    #[serde(default)]
    pub trigger: String,
    /// Image-generation prompt.
    #[serde(default)]
    pub visual_prompt: String,
    pub format: PayloadFormat,
    #[serde(default)]
    pub caption: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PayloadBatch {
    #[serde(default)]
    pub payloads: Vec<ViralPayload>,
}

/// Everything `--matrix` produces, as printed in JSON mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixReport {
    pub subject_id: String,
    pub subject_name: String,
    pub intent: String,
    pub backend: String,
    pub matrix: StrategyMatrix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payloads: Vec<ViralPayload>,
}

fn string_array() -> Value {
    json!({ "type": "ARRAY", "items": { "type": "STRING" } })
}

/// Response schema for the matrix call, in the Gemini `responseSchema` dialect.
pub(crate) fn matrix_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "avatars": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "demographic": { "type": "STRING" },
                        "psychographic": { "type": "STRING" },
                        "painPoints": string_array()
                    },
                    "required": ["name"]
                }
            },
            "angles": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "tone": { "type": "STRING" },
                        "narrativeFocus": { "type": "STRING" },
                        "keyMessage": { "type": "STRING" }
                    },
                    "required": ["name"]
                }
            }
        },
        "required": ["avatars", "angles"]
    })
}

pub(crate) fn payload_schema() -> Value {
    let formats: Vec<&str> = PayloadFormat::ALL.iter().map(|f| f.as_str()).collect();
    json!({
        "type": "OBJECT",
        "properties": {
            "payloads": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "hook": { "type": "STRING", "description": "First 3 seconds text/audio" },
                        "trigger": {
                            "type": "STRING",
                            "description": "Psychological trigger used"
                        },
                        "visualPrompt": {
                            "type": "STRING",
                            "description": "AI image prompt description"
                        },
                        "format": { "type": "STRING", "enum": formats },
                        "caption": { "type": "STRING", "description": "Social media caption" }
                    },
                    "required": ["hook", "format"]
                }
            }
        },
        "required": ["payloads"]
    })
}

/// Text rendering of a matrix report for `--matrix` text output.
pub fn render_report(report: &MatrixReport) -> Vec<String> {
    let mut lines = vec![
        format!("Strategy matrix / target {} / backend {}", report.subject_name, report.backend),
        format!("Intent: {}", report.intent),
        String::new(),
        "Audience avatars:".to_string(),
    ];
    for (i, avatar) in report.matrix.avatars.iter().enumerate() {
        lines.push(format!("  A{} {}: {}", i + 1, avatar.name, avatar.demographic));
        if !avatar.psychographic.is_empty() {
            lines.push(format!("     {}", avatar.psychographic));
        }
        if !avatar.pain_points.is_empty() {
            lines.push(format!("     pain points: {}", avatar.pain_points.join("; ")));
        }
    }
    lines.push(String::new());
    lines.push("Narrative angles:".to_string());
    for (i, angle) in report.matrix.angles.iter().enumerate() {
        lines.push(format!("  N{} {} ({})", i + 1, angle.name, angle.tone));
        if !angle.narrative_focus.is_empty() {
            lines.push(format!("     focus: {}", angle.narrative_focus));
        }
        if !angle.key_message.is_empty() {
            lines.push(format!("     message: {}", angle.key_message));
        }
    }

    if let Some(cell) = &report.cell {
        lines.push(String::new());
        lines.push(format!("Payloads for cell {cell}:"));
        for payload in &report.payloads {
            lines.push(format!("  [{}] \"{}\"", payload.format.as_str(), payload.hook));
            if !payload.trigger.is_empty() {
                lines.push(format!("     trigger: {}", payload.trigger));
            }
            if !payload.caption.is_empty() {
                lines.push(format!("     caption: {}", payload.caption));
            }
            if !payload.visual_prompt.is_empty() {
                lines.push(format!("     visual: {}", payload.visual_prompt));
            }
        }
    } else if !report.matrix.is_empty() {
        lines.push(String::new());
        lines.push("Pick a cell with --cell <avatar>:<angle> to generate payloads.".to_string());
    }
    lines
}
