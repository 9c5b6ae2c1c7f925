use proptest::prelude::*;
use visionmanifest::adaptor::{AdaptorRegistry, ExportOptions, IngestOptions};
use visionmanifest::manifest::{AnyManifest, BBoxFormat, TaskType};

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn ingested_categories_are_dense_and_ordered_by_declared_id(
        (document, names) in proptest_helpers::arb_sparse_category_document(),
    ) {
        let manifest = AdaptorRegistry::standard()
            .ingest_value(TaskType::ClassificationMultilabel, document, &IngestOptions::default())
            .expect("ingest")
            .into_single_image()
            .expect("single-image manifest");

        let categories = manifest.categories.single();
        let ids: Vec<usize> = categories.iter().map(|c| c.id).collect();
        prop_assert_eq!(ids, (0..names.len()).collect::<Vec<_>>());
        let got: Vec<String> = categories.iter().map(|c| c.name.clone()).collect();
        prop_assert_eq!(got, names);

        for image in &manifest.images {
            for label in image.single_labels() {
                let id = label.category_id().expect("classification label");
                prop_assert!(id < categories.len());
            }
        }
    }

    #[test]
    fn detection_export_is_a_left_inverse_of_ingest(
        manifest in proptest_helpers::arb_detection(12, 4),
    ) {
        let registry = AdaptorRegistry::standard();
        let any: AnyManifest = manifest.clone().into();
        let document = registry
            .export_document(&any, &ExportOptions::default().with_bbox_format(BBoxFormat::Ltrb))
            .expect("export");
        let restored = registry
            .ingest_value(TaskType::ObjectDetection, document, &IngestOptions::default())
            .expect("ingest");
        prop_assert_eq!(restored, any);
    }
}
