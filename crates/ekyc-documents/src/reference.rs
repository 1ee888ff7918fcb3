use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{DocumentError, DocumentResult};

const BUILTIN_STATES: &str = include_str!("../assets/my_states.json");
const BUILTIN_POSTCODES: &str = include_str!("../assets/my_postcodes.json");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostcodeEntry {
    pub postcode: String,
    pub city: String,
    pub state: String,
}

/// Malaysian states and postcodes used to read MyKad addresses.
#[derive(Debug, Clone, Default)]
pub struct MalaysianReference {
    states: Vec<String>,
    postcodes: HashMap<String, PostcodeEntry>,
}

impl MalaysianReference {
    pub fn builtin() -> DocumentResult<Self> {
        Self::from_json(BUILTIN_STATES, BUILTIN_POSTCODES)
    }

    pub fn from_json(states: &str, postcodes: &str) -> DocumentResult<Self> {
        let states: Vec<String> = serde_json::from_str(states).map_err(|err| {
            DocumentError::configuration(format!("invalid Malaysian state list: {err}"))
        })?;
        let postcodes: Vec<PostcodeEntry> = serde_json::from_str(postcodes).map_err(|err| {
            DocumentError::configuration(format!("invalid Malaysian postcode table: {err}"))
        })?;
        if states.is_empty() {
            return Err(DocumentError::configuration(
                "Malaysian state list must not be empty",
            ));
        }
        Ok(Self {
            states: states.iter().map(|state| normalize(state)).collect(),
            postcodes: postcodes
                .into_iter()
                .map(|entry| (entry.postcode.clone(), entry))
                .collect(),
        })
    }

    /// Whether `text` names a state, ignoring case and whitespace.
    pub fn is_state(&self, text: &str) -> bool {
        let candidate = normalize(text);
        !candidate.is_empty() && self.states.iter().any(|state| *state == candidate)
    }

    pub fn postcode(&self, code: &str) -> Option<&PostcodeEntry> {
        self.postcodes.get(code)
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
