use catalog_core::{ExtractionResult, PipelineStage, StageReport, StageStatus, Summary};
use pretty_assertions::assert_eq;

#[test]
fn report_has_one_line_per_stage() {
    let summary = Summary {
        stages: vec![
            StageReport {
                stage: PipelineStage::Variants,
                ok_count: 3,
                error_count: 1,
                status: StageStatus::Completed,
            },
            StageReport {
                stage: PipelineStage::Competitors,
                ok_count: 1,
                error_count: 0,
                status: StageStatus::Cancelled,
            },
            StageReport::skipped(PipelineStage::Export),
        ],
    };

    assert_eq!(
        summary.report(),
        "variants: 3 ok, 1 errors\ncompetitors: 1 ok, 0 errors (cancelled)\nexport: 0 ok, 0 errors (skipped)"
    );
    assert!(summary.interrupted());
    assert_eq!(summary.total_errors(), 1);
    assert_eq!(
        summary.stage(PipelineStage::Competitors).map(|r| r.ok_count),
        Some(1)
    );
}

#[test]
fn failure_result_carries_identifier_and_no_rows() {
    let failure = ExtractionResult::failure("A2", "title not found");
    assert!(failure.is_failure());
    assert_eq!(failure.identifier(), "A2");
    assert!(failure.rows().is_empty());
}
