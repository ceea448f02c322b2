//! Dialogue script handling
//!
//! Turns `Speaker: line` scripts into ordered script lines and helps build
//! the speaker to voice mapping the production needs.

pub mod parser;

pub use parser::{
    assign_voices, missing_speakers, parse_script, speakers, ScriptLine, SpeakerVoiceMap,
};
