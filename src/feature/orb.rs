use log::{debug, warn};
use nalgebra as na;
use opencv::{
    core::{KeyPoint, Mat, Ptr, Vector},
    features2d::ORB,
    imgcodecs,
    prelude::*,
};
use std::fs;
use std::path::{Path, PathBuf};

use super::correspondence::{FeatureSource, FrameFeatures};
use super::descriptor::BinaryDescriptor;
use crate::error::{Result, VoError};

/// ORB features of the grayscale `.png` images in a directory, in file name order
pub struct OrbFeatureSource {
    paths: Vec<PathBuf>,
    orb: Ptr<ORB>,
}

impl OrbFeatureSource {
    /// List the images of `dir`. Fails when the directory cannot be read or holds no images.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(VoError::config(format!(
                "no .png images in {}",
                dir.display()
            )));
        }

        let orb = ORB::create_def()?;
        Ok(Self { paths, orb })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn detect(&mut self, path: &Path) -> opencv::Result<Option<FrameFeatures>> {
        let image = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_GRAYSCALE)?;
        if image.empty() {
            warn!("could not read image {}", path.display());
            return Ok(None);
        }

        let mut keypoints: Vector<KeyPoint> = Vector::new();
        let mut descriptors = Mat::default();
        self.orb.detect_and_compute(
            &image,
            &Mat::default(),
            &mut keypoints,
            &mut descriptors,
            false,
        )?;
        if descriptors.empty() {
            return Ok(None);
        }

        let mut features = FrameFeatures::default();
        for (row, kp) in keypoints.iter().enumerate() {
            let Some(descriptor) = BinaryDescriptor::from_slice(descriptors.at_row::<u8>(row as i32)?)
            else {
                continue;
            };
            let pt = kp.pt();
            features.keypoints.push(na::Point2::new(pt.x, pt.y));
            features.descriptors.push(descriptor);
        }
        debug!("{}: {} features", path.display(), features.keypoints.len());
        Ok(Some(features))
    }
}

impl FeatureSource for OrbFeatureSource {
    fn len(&self) -> usize {
        self.paths.len()
    }

    fn features(&mut self, index: usize) -> Option<FrameFeatures> {
        let path = self.paths.get(index)?.clone();
        match self.detect(&path) {
            Ok(features) => features,
            Err(e) => {
                warn!("feature extraction failed for {}: {}", path.display(), e);
                None
            }
        }
    }
}
