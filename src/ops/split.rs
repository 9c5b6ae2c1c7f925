//! Train/validation splitting with per-category balancing.

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::error::ManifestError;
use crate::manifest::{DatasetManifest, ImageDataManifest};
use crate::stats::CategoryIndex;

/// Split options. `ratio` is the share of images that goes to the first
/// partition.
#[derive(Clone, Debug)]
pub struct SplitConfig {
    pub ratio: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            ratio: 0.8,
            seed: 0,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), ManifestError> {
        if !(0.0..=1.0).contains(&self.ratio) {
            return Err(ManifestError::precondition(format!(
                "split ratio must be in [0, 1], got {}",
                self.ratio
            )));
        }
        Ok(())
    }
}

/// Running per-partition counts.
struct Partition {
    images: Vec<ImageDataManifest>,
    counts: Vec<usize>,
    negatives: usize,
    /// Multiplier that makes this partition's counts comparable to the other's.
    weight: f64,
}

impl Partition {
    fn new(categories: usize, weight: f64) -> Self {
        Self {
            images: Vec::new(),
            counts: vec![0; categories],
            negatives: 0,
            weight,
        }
    }

    /// Weighted `(min, sum)` over the counts `slots` touch.
    fn pressure(&self, slots: &[usize]) -> (f64, f64) {
        let weighted = slots.iter().map(|&s| self.counts[s] as f64 * self.weight);
        let min = weighted.clone().fold(f64::INFINITY, f64::min);
        (min, weighted.sum())
    }

    fn take(&mut self, image: &ImageDataManifest, slots: &[usize]) {
        if slots.is_empty() {
            self.negatives += 1;
        }
        for &slot in slots {
            self.counts[slot] += 1;
        }
        self.images.push(image.clone());
    }
}

/// Splits `manifest` into two disjoint manifests.
///
/// Images are visited in seeded-shuffle order. Labeled images go to the
/// partition whose touched categories are furthest below target (lower
/// weighted minimum, then lower weighted sum). Negative images go wherever
/// the negative ratio is behind. Datasets without categories are cut at
/// `floor(N * ratio)`.
pub fn split(
    manifest: &DatasetManifest,
    config: &SplitConfig,
) -> Result<(DatasetManifest, DatasetManifest), ManifestError> {
    config.validate()?;
    let n = manifest.images.len();
    let ratio = config.ratio;
    let cut = (n as f64 * ratio).floor() as usize;

    let with_images = |images: Vec<ImageDataManifest>| DatasetManifest {
        images,
        ..empty_like(manifest)
    };

    if cut == 0 {
        tracing::info!(ratio, first = 0, second = n, "split degenerate: all images to second");
        return Ok((with_images(Vec::new()), with_images(manifest.images.clone())));
    }
    if cut >= n {
        tracing::info!(ratio, first = n, second = 0, "split degenerate: all images to first");
        return Ok((with_images(manifest.images.clone()), with_images(Vec::new())));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    order.shuffle(&mut rng);

    let index = CategoryIndex::new(manifest);
    if index.is_empty() {
        let first = order[..cut].iter().map(|&i| manifest.images[i].clone()).collect();
        let second = order[cut..].iter().map(|&i| manifest.images[i].clone()).collect();
        tracing::info!(ratio, first = cut, second = n - cut, "split by shuffled cut");
        return Ok((with_images(first), with_images(second)));
    }

    let mut first = Partition::new(index.len(), 1.0 - ratio);
    let mut second = Partition::new(index.len(), ratio);
    for i in order {
        let image = &manifest.images[i];
        let slots = index.image_slots(image);
        let to_second = if slots.is_empty() {
            (first.negatives as f64) * (1.0 - ratio) > (second.negatives as f64) * ratio
        } else {
            let (first_min, first_sum) = first.pressure(&slots);
            let (second_min, second_sum) = second.pressure(&slots);
            second_min < first_min || (second_min == first_min && second_sum < first_sum)
        };
        if to_second {
            second.take(image, &slots);
        } else {
            first.take(image, &slots);
        }
    }

    tracing::info!(
        ratio,
        seed = config.seed,
        first = first.images.len(),
        second = second.images.len(),
        "split manifest"
    );
    Ok((with_images(first.images), with_images(second.images)))
}

fn empty_like(manifest: &DatasetManifest) -> DatasetManifest {
    DatasetManifest {
        images: Vec::new(),
        categories: manifest.categories.clone(),
        data_type: manifest.data_type.clone(),
        additional_info: manifest.additional_info.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{AdditionalInfo, Categories, CategoryManifest, LabelManifest, TaskType};
    use crate::stats::instance_counts;

    fn multiclass(per_class: usize, classes: usize) -> DatasetManifest {
        let images = (0..per_class * classes)
            .map(|i| {
                ImageDataManifest::new(i, format!("{}.jpg", i))
                    .with_labels(vec![LabelManifest::classification(i % classes)])
            })
            .collect();
        DatasetManifest::new(
            images,
            Categories::Single(
                (0..classes)
                    .map(|c| CategoryManifest::new(c, format!("c{}", c)))
                    .collect(),
            ),
            TaskType::ClassificationMulticlass.into(),
            AdditionalInfo::new(),
        )
        .expect("manifest")
    }

    #[test]
    fn halves_are_balanced_per_category() {
        let manifest = multiclass(10, 3);
        let (first, second) = split(
            &manifest,
            &SplitConfig {
                ratio: 0.5,
                seed: 7,
            },
        )
        .expect("split");
        let index = CategoryIndex::new(&manifest);
        assert_eq!(instance_counts(&first, &index), vec![5, 5, 5]);
        assert_eq!(instance_counts(&second, &index), vec![5, 5, 5]);
    }

    #[test]
    fn degenerate_ratios() {
        let manifest = multiclass(2, 2);
        let config = SplitConfig {
            ratio: 0.0,
            seed: 1,
        };
        let (first, second) = split(&manifest, &config).expect("split");
        assert!(first.is_empty());
        assert_eq!(second.len(), 4);

        let config = SplitConfig {
            ratio: 1.0,
            seed: 1,
        };
        let (first, second) = split(&manifest, &config).expect("split");
        assert_eq!(first.len(), 4);
        assert!(second.is_empty());
    }

    #[test]
    fn uncategorized_data_is_cut_by_ratio() {
        let images = (0..10usize)
            .map(|i| {
                ImageDataManifest::new(i, format!("{}.jpg", i))
                    .with_labels(vec![LabelManifest::caption("x")])
            })
            .collect();
        let manifest = DatasetManifest::new(
            images,
            Categories::None,
            TaskType::ImageCaption.into(),
            AdditionalInfo::new(),
        )
        .expect("manifest");
        let config = SplitConfig {
            ratio: 0.7,
            seed: 3,
        };
        let (first, second) = split(&manifest, &config).expect("split");
        assert_eq!(first.len(), 7);
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn negatives_follow_the_ratio() {
        let mut manifest = multiclass(2, 1);
        manifest
            .images
            .extend((0..8usize).map(|i| ImageDataManifest::new(100 + i, "neg.jpg")));
        let config = SplitConfig {
            ratio: 0.5,
            seed: 11,
        };
        let (first, second) = split(&manifest, &config).expect("split");
        let negatives = |m: &DatasetManifest| m.images.iter().filter(|i| i.is_negative()).count();
        assert_eq!(negatives(&first), 4);
        assert_eq!(negatives(&second), 4);
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let manifest = multiclass(1, 1);
        assert!(split(&manifest, &SplitConfig { ratio: 1.5, seed: 0 }).is_err());
    }
}
