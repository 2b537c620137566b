//! Quality scores returned by scorers.
//!
//! A scorer never fails: when it cannot evaluate an image it reports
//! [`Score::Unavailable`], which serializes as the `-1` sentinel.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

const UNAVAILABLE_SENTINEL: i16 = -1;

/// A 0-100 quality score, or the "could not be scored" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum Score {
    Scored(u8),
    Unavailable,
}

impl Score {
    pub fn scored(value: u8) -> Self {
        Score::Scored(value.min(100))
    }

    pub fn is_unavailable(self) -> bool {
        matches!(self, Score::Unavailable)
    }

    pub fn value(self) -> Option<u8> {
        match self {
            Score::Scored(v) => Some(v),
            Score::Unavailable => None,
        }
    }

    /// Keep whichever score is better; any real score beats `Unavailable`.
    pub fn best_of(self, other: Score) -> Score {
        if other > self {
            other
        } else {
            self
        }
    }
}

impl From<i16> for Score {
    fn from(value: i16) -> Self {
        if value < 0 {
            Score::Unavailable
        } else {
            Score::Scored(value.min(100) as u8)
        }
    }
}

impl From<Score> for i16 {
    fn from(score: Score) -> Self {
        match score {
            Score::Scored(v) => i16::from(v),
            Score::Unavailable => UNAVAILABLE_SENTINEL,
        }
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        i16::from(*self).cmp(&i16::from(*other))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Scored(v) => write!(f, "{}", v),
            Score::Unavailable => f.write_str("unscored"),
        }
    }
}

/// Panel-level character consistency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyScore {
    pub overall_score: Score,
    /// Per-dimension sub-scores (face, outfit, proportions, ...)
    #[serde(default)]
    pub dimensions: BTreeMap<String, Score>,
    #[serde(default)]
    pub failure_reasons: Vec<String>,
    pub passes_threshold: bool,
}

impl ConsistencyScore {
    pub fn scored(
        overall: u8,
        threshold: u8,
        dimensions: BTreeMap<String, Score>,
        failure_reasons: Vec<String>,
    ) -> Self {
        let overall = overall.min(100);
        Self {
            overall_score: Score::Scored(overall),
            dimensions,
            failure_reasons,
            passes_threshold: overall >= threshold,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            overall_score: Score::Unavailable,
            dimensions: BTreeMap::new(),
            failure_reasons: vec![reason.into()],
            passes_threshold: false,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.overall_score.is_unavailable()
    }
}

/// Page-level environmental coherence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceReport {
    pub overall_coherence: Score,
    /// Scores per panel, in page order
    #[serde(default)]
    pub panel_scores: Vec<Score>,
    /// Location, lighting, palette, architecture sub-scores
    #[serde(default)]
    pub dimensions: BTreeMap<String, Score>,
    pub cross_panel_consistency: Score,
    #[serde(default)]
    pub failure_reasons: Vec<String>,
    pub passes_threshold: bool,
}

impl CoherenceReport {
    pub fn scored(
        overall: u8,
        threshold: u8,
        panel_scores: Vec<Score>,
        cross_panel_consistency: Score,
        failure_reasons: Vec<String>,
    ) -> Self {
        let overall = overall.min(100);
        Self {
            overall_coherence: Score::Scored(overall),
            panel_scores,
            dimensions: BTreeMap::new(),
            cross_panel_consistency,
            failure_reasons,
            passes_threshold: overall >= threshold,
        }
    }

    pub fn with_dimensions(mut self, dimensions: BTreeMap<String, Score>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            overall_coherence: Score::Unavailable,
            panel_scores: Vec::new(),
            dimensions: BTreeMap::new(),
            cross_panel_consistency: Score::Unavailable,
            failure_reasons: vec![reason.into()],
            passes_threshold: false,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.overall_coherence.is_unavailable()
    }
}
