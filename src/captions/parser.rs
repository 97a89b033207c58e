//! SRT / WebVTT parsing and time lookup
//!
//! Pure functions over caption text. Input is split into blocks on blank
//! lines; a block contributes an entry only if it holds a timecode line.
//! Everything after the timecode line is the cue text, joined with spaces.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

const SRT_TIMECODE: &str =
    r"(\d{1,2}):(\d{2}):(\d{2}),(\d{3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2}),(\d{3})";
const VTT_TIMECODE: &str =
    r"(?:(\d+):)?(\d{2}):(\d{2})\.(\d{3})\s*-->\s*(?:(\d+):)?(\d{2}):(\d{2})\.(\d{3})";

/// Caption file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionFormat {
    Srt,
    Vtt,
}

impl CaptionFormat {
    /// Format from a file name, path or URL extension (query ignored)
    pub fn from_extension(name: &str) -> Option<Self> {
        let name = name.split(['?', '#']).next().unwrap_or(name);
        let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "srt" => Some(CaptionFormat::Srt),
            "vtt" => Some(CaptionFormat::Vtt),
            _ => None,
        }
    }

    /// Format from content: a `WEBVTT` first line means WebVTT, an SRT
    /// timecode anywhere means SRT.
    pub fn sniff(text: &str) -> Option<Self> {
        let text = strip_bom(text).trim_start();
        if text.starts_with("WEBVTT") {
            return Some(CaptionFormat::Vtt);
        }
        let srt = Regex::new(SRT_TIMECODE).ok()?;
        srt.is_match(text).then_some(CaptionFormat::Srt)
    }

    /// Resolve the format once: extension hint, then content, then SRT.
    pub fn classify(hint: Option<&str>, text: &str) -> Self {
        hint.and_then(Self::from_extension)
            .or_else(|| Self::sniff(text))
            .unwrap_or(CaptionFormat::Srt)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionFormat::Srt => "srt",
            CaptionFormat::Vtt => "vtt",
        }
    }
}

impl std::fmt::Display for CaptionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One cue, times in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionEntry {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl CaptionEntry {
    /// Inclusive at both ends
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Parsed caption track, entries in source order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub format: Option<CaptionFormat>,
    entries: Vec<CaptionEntry>,
}

impl CaptionTrack {
    pub fn new(format: CaptionFormat, entries: Vec<CaptionEntry>) -> Self {
        Self {
            format: Some(format),
            entries,
        }
    }

    pub fn entries(&self) -> &[CaptionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry in source order whose span contains `t`
    pub fn active_entry(&self, t: f64) -> Option<&CaptionEntry> {
        self.entries.iter().find(|e| e.contains(t))
    }

    /// Every entry whose span contains `t`, in source order
    pub fn active_entries(&self, t: f64) -> Vec<&CaptionEntry> {
        self.entries.iter().filter(|e| e.contains(t)).collect()
    }
}

/// Parse caption text. `hint` is a file name or URL whose extension picks
/// the format; without one the content is sniffed.
///
/// Zero recognisable cues is a [`Error::ParseFailed`].
pub fn parse(text: &str, hint: Option<&str>) -> Result<CaptionTrack> {
    match CaptionFormat::classify(hint, text) {
        CaptionFormat::Srt => parse_srt(text),
        CaptionFormat::Vtt => parse_vtt(text),
    }
}

pub fn parse_srt(text: &str) -> Result<CaptionTrack> {
    let re = compile(SRT_TIMECODE)?;
    let entries = parse_blocks(text, &re, true)?;
    Ok(CaptionTrack::new(CaptionFormat::Srt, entries))
}

/// WebVTT: the header block, `NOTE` and `STYLE` blocks carry no timecode
/// and fall out naturally. Cue identifiers before the timecode are skipped,
/// cue settings after it are ignored.
pub fn parse_vtt(text: &str) -> Result<CaptionTrack> {
    let re = compile(VTT_TIMECODE)?;
    let entries = parse_blocks(text, &re, false)?;
    Ok(CaptionTrack::new(CaptionFormat::Vtt, entries))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::ParseFailed(e.to_string()))
}

/// `require_text`: SRT blocks are index, timecode and at least one text
/// line; a block without text is dropped.
fn parse_blocks(text: &str, timecode: &Regex, require_text: bool) -> Result<Vec<CaptionEntry>> {
    let normalized = strip_bom(text).replace("\r\n", "\n").replace('\r', "\n");

    let mut entries = Vec::new();
    for block in split_blocks(&normalized) {
        let lines: Vec<&str> = block.lines().collect();
        let Some((idx, caps)) = lines
            .iter()
            .enumerate()
            .find_map(|(i, line)| timecode.captures(line).map(|c| (i, c)))
        else {
            continue;
        };

        let start = seconds(&caps, 1);
        let end = seconds(&caps, 5);
        if end <= start {
            continue;
        }

        let text = lines[idx + 1..].join(" ");
        if require_text && text.trim().is_empty() {
            continue;
        }

        entries.push(CaptionEntry { start, end, text });
    }

    if entries.is_empty() {
        return Err(Error::ParseFailed("no caption entries found".to_string()));
    }
    Ok(entries)
}

/// Blocks separated by one or more blank (or whitespace-only) lines
fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

/// `H*3600 + M*60 + S + ms/1000` from four capture groups starting at `first`.
/// A missing hours group counts as zero.
fn seconds(caps: &Captures, first: usize) -> f64 {
    let part = |i: usize| -> f64 {
        caps.get(first + i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    part(0) * 3600.0 + part(1) * 60.0 + part(2) + part(3) / 1000.0
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
