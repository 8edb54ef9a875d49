//! Story structures a generation can be asked to follow.

use serde::{Deserialize, Serialize};
use std::fmt;

const HEROS_JOURNEY: [&str; 12] = [
    "Ordinary World",
    "Call to Adventure",
    "Refusal",
    "Meeting the Mentor",
    "Crossing the Threshold",
    "Tests and Allies",
    "Approach",
    "Ordeal",
    "Reward",
    "The Road Back",
    "Resurrection",
    "Return with Elixir",
];

/// A named story structure with ordered stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeTemplate {
    ThreeAct,
    HerosJourney,
    Kishotenketsu,
}

impl NarrativeTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            NarrativeTemplate::ThreeAct => "Three Act Structure",
            NarrativeTemplate::HerosJourney => "Hero's Journey",
            NarrativeTemplate::Kishotenketsu => "Kishōtenketsu",
        }
    }

    pub fn stages(&self) -> &'static [&'static str] {
        match self {
            NarrativeTemplate::ThreeAct => &["Setup", "Confrontation", "Resolution"],
            NarrativeTemplate::HerosJourney => &HEROS_JOURNEY,
            NarrativeTemplate::Kishotenketsu => {
                &["Introduction", "Development", "Twist", "Conclusion"]
            }
        }
    }

    /// Writing instruction for the zero-based `stage`; `None` past the end.
    pub fn stage_prompt(&self, stage: usize) -> Option<String> {
        let name = self.stages().get(stage)?;
        let prompt = match (self, stage) {
            (NarrativeTemplate::ThreeAct, 0) => {
                "Establish the world, introduce protagonist, present the inciting incident"
            }
            (NarrativeTemplate::ThreeAct, 1) => "Develop conflict, raise stakes, build to climax",
            (NarrativeTemplate::ThreeAct, _) => {
                "Resolve conflict, show consequences, provide closure"
            }
            (NarrativeTemplate::Kishotenketsu, 0) => {
                "Introduce characters and setting without conflict"
            }
            (NarrativeTemplate::Kishotenketsu, 1) => {
                "Develop the story further, deepen understanding"
            }
            (NarrativeTemplate::Kishotenketsu, 2) => {
                "Introduce an unexpected element that reframes everything"
            }
            (NarrativeTemplate::Kishotenketsu, _) => {
                "Bring elements together in a new understanding"
            }
            (NarrativeTemplate::HerosJourney, _) => {
                return Some(format!("Generate content for stage {}: {name}", stage + 1));
            }
        };
        Some(prompt.to_string())
    }
}

impl fmt::Display for NarrativeTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
