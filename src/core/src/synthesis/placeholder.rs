use image::{Rgb, RgbImage};
use log::debug;
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::error_handling::types::SynthesisError;
use crate::storage::types::collaborator_artifact_name;

pub const PLACEHOLDER_WIDTH: u32 = 512;
pub const PLACEHOLDER_HEIGHT: u32 = 768;

fn random_fill<R: Rng>(rng: &mut R) -> Rgb<u8> {
    Rgb([rng.gen(), rng.gen(), rng.gen()])
}

/// Writes `sample` solid-colour PNGs named like collaborator outputs into `dir`.
pub fn write_placeholders(dir: &Path, sample: u32) -> Result<Vec<PathBuf>, SynthesisError> {
    let mut rng = rand::thread_rng();
    let mut written = Vec::with_capacity(sample as usize);
    for index in 0..sample {
        let path = dir.join(collaborator_artifact_name(index));
        let fill = random_fill(&mut rng);
        let img = RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, fill);
        img.save(&path).map_err(|e| {
            SynthesisError::PlaceholderFailed(format!("{}: {}", path.display(), e))
        })?;
        debug!("Wrote placeholder {}", path.display());
        written.push(path);
    }
    Ok(written)
}
