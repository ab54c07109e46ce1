//! Emotion classes predicted by the fusion model.
//!
//! The index order is part of the trained checkpoint: class `i` of the
//! classifier output is `EmotionLabel::ALL[i]`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of emotion classes
pub const NUM_CLASSES: usize = 8;

/// Emotion classes supported by the model (checkpoint order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Neutral,
    Calm,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgust,
    Surprised,
}

impl EmotionLabel {
    /// All labels in class-index order
    pub const ALL: [EmotionLabel; NUM_CLASSES] = [
        EmotionLabel::Neutral,
        EmotionLabel::Calm,
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Fearful,
        EmotionLabel::Disgust,
        EmotionLabel::Surprised,
    ];

    /// Get emotion from class index
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Class index of this emotion
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Get emotion label as string
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Calm => "calm",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Fearful => "fearful",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Surprised => "surprised",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
