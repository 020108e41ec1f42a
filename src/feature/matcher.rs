use super::descriptor::BinaryDescriptor;

/// A match between descriptor `query` of the first set and `train` of the second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// Feature matcher using Brute Force
/// For each descriptor in the first set, this matcher finds the closest descriptor in the second set by trying each one.
/// With cross checking only mutual nearest neighbours are kept.
#[derive(Debug, Clone, Copy)]
pub struct FeatureMatcher {
    cross_check: bool,
}

impl Default for FeatureMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureMatcher {
    /// Create a new cross-checking Hamming matcher
    pub fn new() -> Self {
        Self { cross_check: true }
    }

    pub fn with_cross_check(mut self, cross_check: bool) -> Self {
        self.cross_check = cross_check;
        self
    }

    /// Match descriptors between two frames
    ///
    /// Matches come out in query order. Ties go to the lower index.
    pub fn match_descriptors(
        &self,
        desc1: &[BinaryDescriptor],
        desc2: &[BinaryDescriptor],
    ) -> Vec<DescriptorMatch> {
        if desc1.is_empty() || desc2.is_empty() {
            return Vec::new();
        }

        desc1
            .iter()
            .enumerate()
            .filter_map(|(query, d)| {
                let (train, distance) = nearest(d, desc2)?;
                if self.cross_check {
                    let (back, _) = nearest(&desc2[train], desc1)?;
                    if back != query {
                        return None;
                    }
                }
                Some(DescriptorMatch {
                    query,
                    train,
                    distance,
                })
            })
            .collect()
    }

    /// Keep matches with distance strictly below `max_distance`
    pub fn filter_good_matches(
        &self,
        matches: &[DescriptorMatch],
        max_distance: u32,
    ) -> Vec<DescriptorMatch> {
        matches
            .iter()
            .filter(|m| m.distance < max_distance)
            .copied()
            .collect()
    }
}

fn nearest(d: &BinaryDescriptor, candidates: &[BinaryDescriptor]) -> Option<(usize, u32)> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, d.hamming(c)))
        .min_by_key(|&(i, dist)| (dist, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::descriptor::DESCRIPTOR_BYTES;

    fn desc(fill: u8) -> BinaryDescriptor {
        BinaryDescriptor([fill; DESCRIPTOR_BYTES])
    }

    #[test]
    fn test_empty_match() {
        let matcher = FeatureMatcher::new();
        assert!(matcher.match_descriptors(&[], &[desc(0)]).is_empty());
        assert!(matcher.match_descriptors(&[desc(0)], &[]).is_empty());
    }

    #[test]
    fn test_identical_sets_match_one_to_one() {
        let matcher = FeatureMatcher::new();
        let set = [desc(0x00), desc(0x0f), desc(0xff)];
        let matches = matcher.match_descriptors(&set, &set);
        assert_eq!(matches.len(), 3);
        for (i, m) in matches.iter().enumerate() {
            assert_eq!((m.query, m.train, m.distance), (i, i, 0));
        }
    }

    #[test]
    fn test_cross_check_drops_one_sided_matches() {
        // Both queries are closest to the single train descriptor, only the better one survives
        let first = [desc(0x01), desc(0x03)];
        let second = [desc(0x00)];

        let strict = FeatureMatcher::new().match_descriptors(&first, &second);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].query, 0);
        assert_eq!(strict[0].distance, 32);

        let loose = FeatureMatcher::new()
            .with_cross_check(false)
            .match_descriptors(&first, &second);
        assert_eq!(loose.len(), 2);
    }

    #[test]
    fn test_filter_good_matches_is_strict() {
        let matcher = FeatureMatcher::new();
        let matches = [
            DescriptorMatch {
                query: 0,
                train: 0,
                distance: 49,
            },
            DescriptorMatch {
                query: 1,
                train: 1,
                distance: 50,
            },
        ];
        let good = matcher.filter_good_matches(&matches, 50);
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].distance, 49);
    }
}
