//! Captured captions
//!
//! A learner overlays two tracks (usually target language and native
//! language) and captures the cue on screen into a side list for review.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parser::{CaptionEntry, CaptionTrack};

/// The two independent tracks shown over the video
#[derive(Debug, Clone, Default)]
pub struct DualTrack {
    pub primary: Option<CaptionTrack>,
    pub secondary: Option<CaptionTrack>,
    pub show_primary: bool,
    pub show_secondary: bool,
}

impl DualTrack {
    pub fn new(primary: Option<CaptionTrack>, secondary: Option<CaptionTrack>) -> Self {
        Self {
            show_primary: primary.is_some(),
            show_secondary: secondary.is_some(),
            primary,
            secondary,
        }
    }

    /// Visible cues at `t`: (primary, secondary)
    pub fn active(&self, t: f64) -> (Option<&CaptionEntry>, Option<&CaptionEntry>) {
        fn pick(track: &Option<CaptionTrack>, shown: bool, t: f64) -> Option<&CaptionEntry> {
            track
                .as_ref()
                .filter(|_| shown)
                .and_then(|track| track.active_entry(t))
        }
        (
            pick(&self.primary, self.show_primary, t),
            pick(&self.secondary, self.show_secondary, t),
        )
    }

    /// Cue a capture at `t` would take: primary first, then secondary
    pub fn capture_candidate(&self, t: f64) -> Option<&CaptionEntry> {
        let (primary, secondary) = self.active(t);
        primary.or(secondary)
    }
}

/// A captured cue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl Clip {
    /// `start - end` as shown in the list
    pub fn span_label(&self) -> String {
        format!(
            "{} - {}",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}

/// Ordered list of captured cues
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipList {
    clips: Vec<Clip>,
}

impl ClipList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a copy of `entry`, returning the stored clip
    pub fn add(&mut self, entry: &CaptionEntry) -> &Clip {
        self.clips.push(Clip {
            id: Uuid::new_v4().to_string(),
            text: entry.text.clone(),
            start: entry.start,
            end: entry.end,
        });
        let last = self.clips.len() - 1;
        &self.clips[last]
    }

    /// Capture whatever cue is on screen at `t`.
    ///
    /// `None` when neither visible track has a cue at that time.
    pub fn capture(&mut self, tracks: &DualTrack, t: f64) -> Option<&Clip> {
        let entry = tracks.capture_candidate(t)?.clone();
        Some(self.add(&entry))
    }

    /// Remove by id. Returns false if no such clip exists.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.clips.len();
        self.clips.retain(|c| c.id != id);
        self.clips.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// `[H:]MM:SS.mmm`; the hours field only appears past one hour
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let h = total_ms / 3_600_000;
    let m = (total_ms / 60_000) % 60;
    let s = (total_ms / 1000) % 60;
    let ms = total_ms % 1000;

    if h > 0 {
        format!("{}:{:02}:{:02}.{:03}", h, m, s, ms)
    } else {
        format!("{:02}:{:02}.{:03}", m, s, ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::parser::{parse_srt, parse_vtt};

    fn tracks() -> DualTrack {
        let primary = parse_srt("1\n00:00:01,000 --> 00:00:03,000\nHola\n").unwrap();
        let secondary = parse_vtt(
            "WEBVTT\n\n00:00:02.000 --> 00:00:06.000\nHello\n",
        )
        .unwrap();
        DualTrack::new(Some(primary), Some(secondary))
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00.000");
        assert_eq!(format_timestamp(2.5), "00:02.500");
        assert_eq!(format_timestamp(61.001), "01:01.001");
        assert_eq!(format_timestamp(3723.45), "1:02:03.450");
    }

    #[test]
    fn test_capture_prefers_primary() {
        let tracks = tracks();
        let mut clips = ClipList::new();
        assert_eq!(clips.capture(&tracks, 2.5).unwrap().text, "Hola");
        assert_eq!(clips.capture(&tracks, 4.0).unwrap().text, "Hello");
        assert!(clips.capture(&tracks, 10.0).is_none());
        assert_eq!(clips.len(), 2);
    }

    #[test]
    fn test_hidden_track_not_captured() {
        let mut tracks = tracks();
        tracks.show_primary = false;
        let mut clips = ClipList::new();
        assert_eq!(clips.capture(&tracks, 2.5).unwrap().text, "Hello");
    }

    #[test]
    fn test_remove_clip() {
        let tracks = tracks();
        let mut clips = ClipList::new();
        let id = clips.capture(&tracks, 1.0).unwrap().id.clone();
        clips.capture(&tracks, 5.0);

        assert!(clips.remove(&id));
        assert!(!clips.remove(&id));
        assert_eq!(clips.len(), 1);
        assert_eq!(clips.iter().next().unwrap().text, "Hello");
    }

    #[test]
    fn test_span_label() {
        let clip = Clip {
            id: "x".into(),
            text: "t".into(),
            start: 2.0,
            end: 5.0,
        };
        assert_eq!(clip.span_label(), "00:02.000 - 00:05.000");
    }
}
