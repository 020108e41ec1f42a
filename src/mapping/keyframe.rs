use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::feature::{BinaryDescriptor, FeatureMatcher, FeatureSource};

/// Keyframe selection criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeConfig {
    /// A frame with fewer good matches against the reference becomes a keyframe
    pub match_threshold: usize,
    /// Matches at or above this Hamming distance are not good
    pub max_descriptor_distance: u32,
    /// Frame stride of the scan
    pub step: usize,
}

impl Default for KeyframeConfig {
    fn default() -> Self {
        Self {
            match_threshold: 40,
            max_descriptor_distance: 50,
            step: 1,
        }
    }
}

/// Selection state threaded through the scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeState {
    /// Descriptors of the latest keyframe, `None` if that frame had none
    pub reference: Option<Vec<BinaryDescriptor>>,
    pub keyframes: Vec<usize>,
}

impl KeyframeState {
    /// State after looking at frame 0, which is always a keyframe
    pub fn start(reference: Option<Vec<BinaryDescriptor>>) -> Self {
        Self {
            reference: reference.filter(|d| !d.is_empty()),
            keyframes: vec![0],
        }
    }
}

/// Picks keyframes where the view has drifted away from the last keyframe,
/// measured by how many descriptors still match
pub struct KeyframeSelector {
    config: KeyframeConfig,
    matcher: FeatureMatcher,
}

impl Default for KeyframeSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyframeSelector {
    /// Create new keyframe selector with default config
    pub fn new() -> Self {
        Self::with_config(KeyframeConfig::default())
    }

    /// Create new keyframe selector with custom config
    pub fn with_config(config: KeyframeConfig) -> Self {
        Self {
            config,
            matcher: FeatureMatcher::new(),
        }
    }

    pub fn config(&self) -> &KeyframeConfig {
        &self.config
    }

    /// Advance the state by one frame.
    ///
    /// Frames without descriptors, or with no reference to compare against,
    /// leave the state untouched.
    pub fn step(
        &self,
        mut state: KeyframeState,
        index: usize,
        descriptors: Option<Vec<BinaryDescriptor>>,
    ) -> KeyframeState {
        let Some(current) = descriptors.filter(|d| !d.is_empty()) else {
            debug!("frame {}: no descriptors, skipped", index);
            return state;
        };
        let Some(reference) = state.reference.as_deref() else {
            return state;
        };

        let matches = self.matcher.match_descriptors(reference, &current);
        let good = self
            .matcher
            .filter_good_matches(&matches, self.config.max_descriptor_distance)
            .len();
        debug!("frame {}: {} good matches", index, good);

        if good < self.config.match_threshold {
            state.keyframes.push(index);
            state.reference = Some(current);
        }
        state
    }

    /// Scan the whole sequence and return the keyframe indices.
    ///
    /// The result starts at 0 and is strictly increasing. An empty sequence has
    /// no keyframes.
    pub fn select<S: FeatureSource>(&self, mut source: S) -> Vec<usize> {
        let total = source.len();
        if total == 0 {
            return Vec::new();
        }

        let initial = KeyframeState::start(source.features(0).map(|f| f.descriptors));
        let state = (1..total)
            .step_by(self.config.step.max(1))
            .fold(initial, |state, i| {
                let descriptors = source.features(i).map(|f| f.descriptors);
                self.step(state, i, descriptors)
            });

        info!(
            "selected {} keyframes out of {} frames",
            state.keyframes.len(),
            total
        );
        state.keyframes
    }
}
