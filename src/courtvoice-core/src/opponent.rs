//! Counter-argument client.
//!
//! Fetches the AI opponent's rebuttal from the game backend. Upstream of the
//! speech engine: the engine only ever sees the resulting text.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::config::SynthesisConfig;
use crate::error::SpeechError;

/// How punishing the opponent's argumentation should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(s)
    }
}

impl FromStr for Difficulty {
    type Err = SpeechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(SpeechError::Opponent(format!(
                "unknown difficulty: {other}"
            ))),
        }
    }
}

/// Which side of the topic the player argues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateSide {
    Proponent,
    Opponent,
}

impl fmt::Display for DebateSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DebateSide::Proponent => "proponent",
            DebateSide::Opponent => "opponent",
        };
        f.write_str(s)
    }
}

impl FromStr for DebateSide {
    type Err = SpeechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "proponent" | "for" => Ok(DebateSide::Proponent),
            "opponent" | "against" => Ok(DebateSide::Opponent),
            other => Err(SpeechError::Opponent(format!("unknown side: {other}"))),
        }
    }
}

pub struct OpponentClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OpponentClient {
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Ask the backend for a rebuttal to the player's transcript.
    pub async fn generate(
        &self,
        topic: &str,
        difficulty: Difficulty,
        player_transcript: &str,
        side: DebateSide,
    ) -> Result<String, SpeechError> {
        #[derive(Serialize)]
        struct CounterArgumentRequest<'a> {
            topic: &'a str,
            difficulty: String,
            player_transcript: &'a str,
            role: String,
        }

        let request = CounterArgumentRequest {
            topic,
            difficulty: difficulty.to_string(),
            player_transcript,
            role: side.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/get-counterargument", self.endpoint))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Opponent(format!(
                "backend error {status}: {body}"
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        extract_argument(&payload).ok_or_else(|| {
            SpeechError::Opponent("backend returned no argument text".to_string())
        })
    }
}

/// The backend has answered under several different keys over time; accept
/// any of them.
fn extract_argument(payload: &serde_json::Value) -> Option<String> {
    for key in ["argument", "text", "response", "message", "content"] {
        if let Some(text) = payload.get(key).and_then(|v| v.as_str()) {
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_argument_primary_key() {
        let payload = json!({ "argument": "I disagree entirely." });
        assert_eq!(
            extract_argument(&payload).as_deref(),
            Some("I disagree entirely.")
        );
    }

    #[test]
    fn test_extract_argument_alternate_keys() {
        let payload = json!({ "response": "  On the contrary.  " });
        assert_eq!(
            extract_argument(&payload).as_deref(),
            Some("On the contrary.")
        );
    }

    #[test]
    fn test_extract_argument_rejects_empty() {
        assert_eq!(extract_argument(&json!({ "argument": "   " })), None);
        assert_eq!(extract_argument(&json!({ "score": 3 })), None);
    }

    #[test]
    fn test_difficulty_round_trip() {
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!(Difficulty::Medium.to_string(), "medium");
        assert!("impossible".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_side_aliases() {
        assert_eq!("for".parse::<DebateSide>().unwrap(), DebateSide::Proponent);
        assert_eq!(
            "against".parse::<DebateSide>().unwrap(),
            DebateSide::Opponent
        );
    }
}
