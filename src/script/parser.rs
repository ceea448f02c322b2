//! Parser for `Speaker: dialogue` scripts
//!
//! Each physical line of the script is inspected on its own. The first colon
//! separates the speaker token from the dialogue; lines that do not carry a
//! speaker are skipped rather than rejected.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Speaker name to backend voice id
pub type SpeakerVoiceMap = BTreeMap<String, String>;

/// One line of dialogue attributed to a speaker
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptLine {
    /// Speaker name as written in the script (case-sensitive)
    pub speaker: String,

    /// Dialogue text with surrounding whitespace removed
    pub text: String,

    /// Position of this line among the accepted lines of the script
    pub order_index: usize,
}

impl ScriptLine {
    /// Create a new script line
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, order_index: usize) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            order_index,
        }
    }

    /// Number of whitespace separated words in the dialogue
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Parse a raw script into ordered lines
///
/// Lines without a colon, blank lines, lines whose speaker token is empty or
/// purely numeric (`10:30 we met`), and lines with no dialogue are skipped.
pub fn parse_script(raw: &str) -> Vec<ScriptLine> {
    let mut lines = Vec::new();

    for physical in raw.lines() {
        if let Some((speaker, dialogue)) = split_speaker(physical) {
            let order_index = lines.len();
            lines.push(ScriptLine::new(speaker, dialogue, order_index));
        }
    }

    lines
}

fn split_speaker(line: &str) -> Option<(&str, &str)> {
    let (speaker, dialogue) = line.split_once(':')?;
    let speaker = speaker.trim();
    let dialogue = dialogue.trim();

    if speaker.is_empty() || dialogue.is_empty() {
        return None;
    }

    // Timestamps such as "10:30" are not speakers
    if speaker.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some((speaker, dialogue))
}

/// Distinct speakers in first-appearance order
pub fn speakers(lines: &[ScriptLine]) -> Vec<String> {
    let mut seen = HashSet::new();
    lines
        .iter()
        .filter(|line| seen.insert(line.speaker.as_str()))
        .map(|line| line.speaker.clone())
        .collect()
}

/// Speakers of the script that have no entry in the voice map, in
/// first-appearance order
pub fn missing_speakers(lines: &[ScriptLine], voice_map: &SpeakerVoiceMap) -> Vec<String> {
    speakers(lines)
        .into_iter()
        .filter(|speaker| !voice_map.contains_key(speaker))
        .collect()
}

/// Default round-robin voice assignment
///
/// Used by callers that want a starting point for the mapping; the pipeline
/// itself never fills in voices.
pub fn assign_voices(speakers: &[String], voices: &[String]) -> SpeakerVoiceMap {
    if voices.is_empty() {
        return SpeakerVoiceMap::new();
    }

    speakers
        .iter()
        .enumerate()
        .map(|(i, speaker)| (speaker.clone(), voices[i % voices.len()].clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_dialogue() {
        let lines = parse_script("A: Hello there.\nB: Hi!");

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], ScriptLine::new("A", "Hello there.", 0));
        assert_eq!(lines[1], ScriptLine::new("B", "Hi!", 1));
    }

    #[test]
    fn test_first_colon_is_delimiter() {
        let lines = parse_script("Narrator: Time check: it is late.");

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].speaker, "Narrator");
        assert_eq!(lines[0].text, "Time check: it is late.");
    }

    #[test]
    fn test_skips_lines_without_speaker() {
        let script = "\n   \nJust some narration\nAlice:   Hi,  Bob!  \n\t\nBob: Hey.";
        let lines = parse_script(script);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].speaker, "Alice");
        assert_eq!(lines[0].text, "Hi,  Bob!");
        assert_eq!(lines[0].order_index, 0);
        assert_eq!(lines[1].order_index, 1);
    }

    #[test]
    fn test_skips_numeric_and_empty_tokens() {
        let lines = parse_script("10:30 we met\n: no speaker\nAlice:\nAlice: Real line");

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Real line");
    }

    #[test]
    fn test_speakers_are_case_sensitive_and_ordered() {
        let lines = parse_script("bob: one\nAlice: two\nBob: three\nbob: four");
        assert_eq!(speakers(&lines), vec!["bob", "Alice", "Bob"]);
    }

    #[test]
    fn test_missing_speakers() {
        let lines = parse_script("A: one\nB: two\nC: three\nA: four");
        let mut map = SpeakerVoiceMap::new();
        map.insert("B".to_string(), "v2".to_string());

        assert_eq!(missing_speakers(&lines, &map), vec!["A", "C"]);
    }

    #[test]
    fn test_assign_voices_round_robin() {
        let speakers = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let voices = vec!["v1".to_string(), "v2".to_string()];
        let map = assign_voices(&speakers, &voices);

        assert_eq!(map["A"], "v1");
        assert_eq!(map["B"], "v2");
        assert_eq!(map["C"], "v1");
        assert!(assign_voices(&speakers, &[]).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_script("").is_empty());
    }
}
