mod correspondence;
mod descriptor;
mod matcher;
#[cfg(feature = "opencv")]
mod orb;

pub use correspondence::{
    CorrespondenceProvider, CorrespondenceSet, FeatureSource, FrameFeatures,
    MatchingCorrespondences,
};
pub use descriptor::{BinaryDescriptor, DESCRIPTOR_BYTES};
pub use matcher::{DescriptorMatch, FeatureMatcher};
#[cfg(feature = "opencv")]
pub use orb::OrbFeatureSource;
