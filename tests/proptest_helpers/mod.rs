#![allow(dead_code)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use serde_json::{json, Value};
use visionmanifest::manifest::{
    AdditionalInfo, BBox, Categories, CategoryManifest, DatasetManifest, ImageDataManifest,
    LabelManifest, TaskType,
};

pub const CATEGORY_POOL: [&str; 6] = ["cat", "dog", "bird", "fish", "cow", "horse"];

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

fn categories(names: &[&str]) -> Categories {
    Categories::Single(
        names
            .iter()
            .enumerate()
            .map(|(i, name)| CategoryManifest::new(i, *name))
            .collect(),
    )
}

/// Multiclass manifests; `None` entries are negative images.
pub fn arb_multiclass(max_categories: usize, max_images: usize) -> BoxedStrategy<DatasetManifest> {
    (1..=max_categories.min(CATEGORY_POOL.len()))
        .prop_flat_map(move |k| {
            (
                Just(k),
                prop::collection::vec(prop::option::weighted(0.9, 0..k), 0..=max_images),
            )
        })
        .prop_map(|(k, labels)| {
            let images = labels
                .into_iter()
                .enumerate()
                .map(|(i, label)| {
                    let image = ImageDataManifest::new(i, format!("{}.jpg", i));
                    match label {
                        Some(c) => image.with_labels(vec![LabelManifest::classification(c)]),
                        None => image,
                    }
                })
                .collect();
            DatasetManifest::new(
                images,
                categories(&CATEGORY_POOL[..k]),
                TaskType::ClassificationMulticlass.into(),
                AdditionalInfo::new(),
            )
            .expect("generated multiclass manifest")
        })
        .boxed()
}

/// Multilabel manifests over a random subset of [`CATEGORY_POOL`], so two
/// draws usually share some category names but not all.
pub fn arb_multilabel(max_images: usize, max_labels: usize) -> BoxedStrategy<DatasetManifest> {
    prop::sample::subsequence(CATEGORY_POOL.to_vec(), 1..=CATEGORY_POOL.len())
        .prop_flat_map(move |names| {
            let k = names.len();
            (
                Just(names),
                prop::collection::vec(prop::collection::vec(0..k, 0..=max_labels), 0..=max_images),
            )
        })
        .prop_map(|(names, labels)| {
            let images = labels
                .into_iter()
                .enumerate()
                .map(|(i, slots)| {
                    ImageDataManifest::new(i, format!("{}.jpg", i)).with_labels(
                        slots
                            .into_iter()
                            .map(LabelManifest::classification)
                            .collect(),
                    )
                })
                .collect();
            DatasetManifest::new(
                images,
                categories(&names),
                TaskType::ClassificationMultilabel.into(),
                AdditionalInfo::new(),
            )
            .expect("generated multilabel manifest")
        })
        .boxed()
}

/// Detection manifests with a fixed category list.
pub fn arb_detection(max_images: usize, max_boxes: usize) -> BoxedStrategy<DatasetManifest> {
    let bbox = (0.0f64..100.0, 0.0f64..100.0, 1.0f64..50.0, 1.0f64..50.0)
        .prop_map(|(l, t, w, h)| BBox::from_ltwh(l, t, w, h));
    prop::collection::vec(prop::collection::vec((0..3usize, bbox), 0..=max_boxes), 0..=max_images)
        .prop_map(|boxes| {
            let images = boxes
                .into_iter()
                .enumerate()
                .map(|(i, boxes)| {
                    ImageDataManifest::new(i, format!("{}.jpg", i))
                        .with_size(224, 224)
                        .with_labels(
                            boxes
                                .into_iter()
                                .map(|(c, b)| LabelManifest::detection(c, b))
                                .collect(),
                        )
                })
                .collect();
            DatasetManifest::new(
                images,
                categories(&CATEGORY_POOL[..3]),
                TaskType::ObjectDetection.into(),
                AdditionalInfo::new(),
            )
            .expect("generated detection manifest")
        })
        .boxed()
}

/// Classification documents with arbitrary distinct category ids, as
/// `(document, category names sorted by declared id)`.
pub fn arb_sparse_category_document() -> BoxedStrategy<(Value, Vec<String>)> {
    prop::collection::btree_set(-50i64..500, 1..8)
        .prop_flat_map(|ids| {
            let ids: Vec<i64> = ids.into_iter().collect();
            let n = ids.len();
            (
                Just(ids),
                prop::collection::vec(0..n, 0..12),
                any::<u64>(),
            )
        })
        .prop_map(|(ids, picks, shuffle_key)| {
            let names: BTreeMap<i64, String> =
                ids.iter().map(|id| (*id, format!("c{}", id))).collect();

            // declare categories in a scrambled order
            let mut declared: Vec<i64> = ids.clone();
            declared.sort_by_key(|id| (*id as u64).wrapping_mul(shuffle_key | 1));

            let images: Vec<Value> = (0..picks.len())
                .map(|i| json!({"id": i, "file_name": format!("{}.jpg", i)}))
                .collect();
            let annotations: Vec<Value> = picks
                .iter()
                .enumerate()
                .map(|(i, pick)| {
                    let category_id = ids[*pick];
                    json!({"id": i + 1, "image_id": i, "category_id": category_id})
                })
                .collect();
            let categories: Vec<Value> = declared
                .iter()
                .map(|id| json!({"id": id, "name": format!("c{}", id)}))
                .collect();
            let document = json!({
                "images": images,
                "categories": categories,
                "annotations": annotations,
            });
            (document, names.into_values().collect())
        })
        .boxed()
}

/// Per-category instance counts keyed by name.
pub fn counts_by_name(manifest: &DatasetManifest) -> BTreeMap<String, usize> {
    let names = manifest.categories.single();
    let mut counts: BTreeMap<String, usize> =
        names.iter().map(|c| (c.name.clone(), 0)).collect();
    for image in &manifest.images {
        for label in image.single_labels() {
            if let Some(id) = label.category_id() {
                *counts.entry(names[id].name.clone()).or_default() += 1;
            }
        }
    }
    counts
}

pub fn image_paths(manifest: &DatasetManifest) -> Vec<String> {
    manifest.images.iter().map(|i| i.img_path.clone()).collect()
}
