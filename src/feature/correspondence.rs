use log::debug;
use nalgebra as na;

use super::descriptor::BinaryDescriptor;
use super::matcher::FeatureMatcher;
use crate::odometry::FramePair;

/// Keypoints and descriptors of one frame, index aligned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameFeatures {
    pub keypoints: Vec<na::Point2<f32>>,
    pub descriptors: Vec<BinaryDescriptor>,
}

impl FrameFeatures {
    pub fn new(keypoints: Vec<na::Point2<f32>>, descriptors: Vec<BinaryDescriptor>) -> Self {
        debug_assert_eq!(keypoints.len(), descriptors.len());
        Self {
            keypoints,
            descriptors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Per-frame feature detection and description
pub trait FeatureSource {
    /// Number of frames in the sequence
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Features of frame `index`, `None` when the frame cannot be read
    /// or nothing was detected.
    fn features(&mut self, index: usize) -> Option<FrameFeatures>;
}

impl<S: FeatureSource + ?Sized> FeatureSource for &mut S {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn features(&mut self, index: usize) -> Option<FrameFeatures> {
        (**self).features(index)
    }
}

/// Pixel correspondences of a frame pair, best match first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrespondenceSet {
    pairs: Vec<(na::Point2<i32>, na::Point2<i32>)>,
}

impl CorrespondenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, first: na::Point2<i32>, second: na::Point2<i32>) {
        self.pairs.push((first, second));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(na::Point2<i32>, na::Point2<i32>)> {
        self.pairs.iter()
    }

}

impl FromIterator<(na::Point2<i32>, na::Point2<i32>)> for CorrespondenceSet {
    fn from_iter<I: IntoIterator<Item = (na::Point2<i32>, na::Point2<i32>)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Supplies the correspondences of a frame pair.
/// Failure (unreadable frame, no features) is `None` or an empty set, never an error.
pub trait CorrespondenceProvider {
    fn correspondences(&mut self, pair: FramePair) -> Option<CorrespondenceSet>;
}

/// Correspondences from brute-force matching of a feature source
pub struct MatchingCorrespondences<S> {
    source: S,
    matcher: FeatureMatcher,
    max_matches: usize,
}

impl<S: FeatureSource> MatchingCorrespondences<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            matcher: FeatureMatcher::new(),
            max_matches: 100,
        }
    }

    /// Set how many of the best matches are kept per pair
    pub fn with_max_matches(mut self, max_matches: usize) -> Self {
        self.max_matches = max_matches;
        self
    }
}

impl<S: FeatureSource> CorrespondenceProvider for MatchingCorrespondences<S> {
    fn correspondences(&mut self, pair: FramePair) -> Option<CorrespondenceSet> {
        let first = self.source.features(pair.first)?;
        let second = self.source.features(pair.second)?;
        if first.is_empty() || second.is_empty() {
            debug!("pair {}: no descriptors", pair);
            return None;
        }

        let mut matches = self
            .matcher
            .match_descriptors(&first.descriptors, &second.descriptors);
        // stable, so equal distances keep query order
        matches.sort_by_key(|m| m.distance);

        // pixel coordinates are truncated toward zero
        let to_pixel = |p: &na::Point2<f32>| na::Point2::new(p.x as i32, p.y as i32);
        // a descriptor without a keypoint has no position and is dropped
        let set: CorrespondenceSet = matches
            .iter()
            .filter_map(|m| {
                let a = first.keypoints.get(m.query)?;
                let b = second.keypoints.get(m.train)?;
                Some((to_pixel(a), to_pixel(b)))
            })
            .take(self.max_matches)
            .collect();

        if set.len() < matches.len().min(self.max_matches) {
            debug!("pair {}: matches without keypoints dropped", pair);
        }
        Some(set)
    }
}
