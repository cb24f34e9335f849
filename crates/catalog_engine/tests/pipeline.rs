mod common;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use catalog_core::{PipelineStage, RowKind, RunHooks, StageStatus};
use catalog_engine::{read_product_table, Orchestrator, RunOptions, SessionSettings};
use common::{
    competitor_page, concurrent_settings, items, pipeline_settings, product_page, sync_settings,
    url, FakeFactory, FakeSite,
};
use engine_logging::MemorySink;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

const ALL: [PipelineStage; 3] = [
    PipelineStage::Variants,
    PipelineStage::Competitors,
    PipelineStage::Export,
];

fn recorded_progress() -> (RunHooks, Arc<Mutex<Vec<u8>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let hooks = RunHooks::silent().with_progress(move |p| sink.lock().unwrap().push(p));
    (hooks, seen)
}

#[tokio::test]
async fn competitor_stage_writes_artifact_and_counts_missing_title() {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    site.page(&url("A1"), competitor_page("Blue Mug", "Glazed stoneware."));
    site.page(&url("A2"), r#"<html><body><div class="prose">no heading</div></body></html>"#);
    let log = Arc::new(MemorySink::new());
    let hooks = RunHooks::silent().with_log(log.clone());

    let orchestrator = Orchestrator::new(
        pipeline_settings(dir.path(), sync_settings()),
        FakeFactory::new(site.clone()),
    );
    let summary = orchestrator
        .run(
            &items(&["A1", "A2"]),
            &[PipelineStage::Competitors],
            RunOptions::default(),
            &hooks,
        )
        .await;

    let report = summary.stage(PipelineStage::Competitors).unwrap();
    assert_eq!((report.ok_count, report.error_count), (1, 1));
    assert_eq!(report.status, StageStatus::Completed);
    assert_eq!(summary.report(), "competitors: 1 ok, 1 errors");

    let artifact = std::fs::read_to_string(dir.path().join("descriptions/blue-mug.txt")).unwrap();
    assert_eq!(
        artifact,
        "<h1>Blue Mug</h1>\n\n<div class=\"prose\"><p>Glazed stoneware. [guide](/guide)</p></div>"
    );
    let written: Vec<_> = std::fs::read_dir(dir.path().join("descriptions"))
        .unwrap()
        .collect();
    assert_eq!(written.len(), 1);
    assert_eq!(log.count_containing("A2 failed"), 1);

    let recap = std::fs::read_to_string(dir.path().join("xlsx/competitors_recap.csv")).unwrap();
    assert_eq!(recap.lines().count(), 3);
    assert!(!orchestrator.checkpoint_store().path().exists());
}

#[tokio::test]
async fn colliding_competitor_titles_are_logged() {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    site.page(&url("A1"), competitor_page("Blue Mug", "first"));
    site.page(&url("A2"), competitor_page("Blue-Mug", "second"));
    let log = Arc::new(MemorySink::new());
    let hooks = RunHooks::silent().with_log(log.clone());

    let orchestrator = Orchestrator::new(
        pipeline_settings(dir.path(), sync_settings()),
        FakeFactory::new(site),
    );
    let summary = orchestrator
        .run(&items(&["A1", "A2"]), &[PipelineStage::Competitors], RunOptions::default(), &hooks)
        .await;

    assert_eq!(summary.report(), "competitors: 2 ok, 0 errors");
    assert_eq!(log.count_containing("A2 replaces blue-mug.txt written for A1"), 1);
    let artifact = std::fs::read_to_string(dir.path().join("descriptions/blue-mug.txt")).unwrap();
    assert!(artifact.starts_with("<h1>Blue-Mug</h1>"));
}

#[tokio::test]
async fn swatches_fan_out_into_parent_and_variations() {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    site.page(&url("A1"), product_page("Tasse Émaillée", "€ 24,90", &["Rouge", "Bleu nuit", "Vert"]));
    site.page(&url("A2"), product_page("Bol", "12", &[]));
    site.page(&url("A3"), product_page("Assiette", "8", &["Rouge"]));

    let orchestrator = Orchestrator::new(
        pipeline_settings(dir.path(), sync_settings()),
        FakeFactory::new(site),
    );
    let summary = orchestrator
        .run(
            &items(&["A1", "A2", "A3"]),
            &[PipelineStage::Variants],
            RunOptions::default(),
            &RunHooks::silent(),
        )
        .await;
    assert_eq!(summary.report(), "variants: 3 ok, 0 errors");

    let rows = read_product_table(&dir.path().join("xlsx/products.csv")).unwrap();
    let kinds: Vec<(String, RowKind)> = rows.iter().map(|r| (r.identifier.clone(), r.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("A1".to_string(), RowKind::Variable),
            ("A1".to_string(), RowKind::Variation),
            ("A1".to_string(), RowKind::Variation),
            ("A1".to_string(), RowKind::Variation),
            ("A2".to_string(), RowKind::Simple),
            ("A3".to_string(), RowKind::Simple),
        ]
    );
    let parent = &rows[0];
    assert_eq!(parent.sku, "TASSE-ÉMAILLÉE");
    assert_eq!(parent.name, "Tasse Émaillée");
    assert_eq!(parent.price, "");
    assert_eq!(parent.attribute_values, "Rouge | Bleu nuit | Vert");
    assert_eq!(parent.attribute_default, "Rouge");
    assert_eq!(parent.folder, "tasse-emaillee");
    assert!(rows[1..4]
        .iter()
        .all(|r| r.parent == parent.sku && r.price == "24.90" && r.name.is_empty()));
    assert_eq!(rows[2].sku, "TASSE-ÉMAILLÉE-BLEUNUIT");
    assert_eq!(rows[4].price, "12");
    assert_eq!((rows[5].sku.as_str(), rows[5].price.as_str()), ("ASSIETTE", "8"));
    assert_eq!(rows[5].attribute_values, "");
}

#[tokio::test]
async fn cancellation_flushes_rows_and_resume_finishes_the_rest() {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    let ids = ["A1", "A2", "A3", "A4", "A5"];
    for id in ids {
        site.page(&url(id), product_page(&format!("Mug {id}"), "10", &[]));
    }
    let list = items(&ids);
    let orchestrator = Orchestrator::new(
        pipeline_settings(dir.path(), sync_settings()),
        FakeFactory::new(site.clone()),
    );

    let (hooks, progress) = recorded_progress();
    let counter = site.clone();
    let hooks = hooks.with_cancel(move || counter.fetch_count() >= 2);
    let summary = orchestrator
        .run(&list, &ALL, RunOptions::default(), &hooks)
        .await;

    let variants = summary.stage(PipelineStage::Variants).unwrap();
    assert_eq!((variants.ok_count, variants.status), (2, StageStatus::Cancelled));
    assert_eq!(summary.stage(PipelineStage::Competitors).unwrap().status, StageStatus::Skipped);
    assert_eq!(summary.stage(PipelineStage::Export).unwrap().status, StageStatus::Skipped);
    assert!(summary.interrupted());

    let progress = progress.lock().unwrap().clone();
    assert_eq!(progress.last(), Some(&100));
    assert_eq!(progress.iter().filter(|p| **p == 100).count(), 1);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    let table = dir.path().join("xlsx/products.csv");
    let flushed: Vec<String> = read_product_table(&table)
        .unwrap()
        .into_iter()
        .map(|r| r.identifier)
        .collect();
    assert_eq!(flushed, vec!["A1", "A2"]);

    let checkpoint = orchestrator.checkpoint_store().load().unwrap();
    assert_eq!(checkpoint.stage, PipelineStage::Variants);
    assert_eq!(checkpoint.processed_ids, BTreeSet::from(["A1".to_string(), "A2".to_string()]));

    let summary = orchestrator
        .run(
            &list,
            &[PipelineStage::Variants],
            RunOptions { resume: true },
            &RunHooks::silent(),
        )
        .await;
    assert_eq!(summary.report(), "variants: 3 ok, 0 errors");
    assert_eq!(
        site.fetched()[2..].to_vec(),
        vec![url("A3"), url("A4"), url("A5")]
    );
    let all: Vec<String> = read_product_table(&table)
        .unwrap()
        .into_iter()
        .map(|r| r.identifier)
        .collect();
    assert_eq!(all, vec!["A1", "A2", "A3", "A4", "A5"]);
    assert!(orchestrator.checkpoint_store().load().is_none());
}

#[tokio::test]
async fn concurrent_cancellation_checkpoints_exactly_the_concluded_items() {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    site.set_latency(std::time::Duration::from_millis(10));
    let ids = ["A1", "A2", "A3", "A4", "A5", "A6", "A7", "A8"];
    for id in ids.iter().filter(|id| **id != "A2") {
        site.page(&url(id), product_page(&format!("Mug {id}"), "10", &[]));
    }
    let orchestrator = Orchestrator::new(
        pipeline_settings(dir.path(), concurrent_settings(3)),
        FakeFactory::new(site.clone()),
    );

    let counter = site.clone();
    let hooks = RunHooks::silent().with_cancel(move || counter.fetch_count() >= 3);
    let summary = orchestrator
        .run(&items(&ids), &[PipelineStage::Variants], RunOptions::default(), &hooks)
        .await;

    let variants = summary.stage(PipelineStage::Variants).unwrap();
    assert_eq!(variants.status, StageStatus::Cancelled);
    let concluded: BTreeSet<String> = site
        .fetched()
        .iter()
        .map(|u| u.trim_start_matches(&url("")).to_string())
        .collect();
    assert!(concluded.len() >= 3 && concluded.len() < ids.len());
    assert_eq!(variants.ok_count + variants.error_count, concluded.len());

    let checkpoint = orchestrator.checkpoint_store().load().unwrap();
    assert_eq!(checkpoint.stage, PipelineStage::Variants);
    assert_eq!(checkpoint.processed_ids, concluded);
}

#[tokio::test]
async fn concurrent_resume_skips_processed_ids_and_finished_stages() {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    site.set_latency(std::time::Duration::from_millis(10));
    let ids = ["A1", "A2", "A3", "A4", "A5", "A6"];
    for id in ids {
        site.page(&url(id), competitor_page(&format!("Doc {id}"), "text"));
    }
    let orchestrator = Orchestrator::new(
        pipeline_settings(dir.path(), concurrent_settings(2)),
        FakeFactory::new(site.clone()),
    );
    let done: BTreeSet<String> = ["A1", "A3"].iter().map(|s| s.to_string()).collect();
    orchestrator
        .checkpoint_store()
        .save(PipelineStage::Competitors, &done)
        .unwrap();

    let summary = orchestrator
        .run(
            &items(&ids),
            &[PipelineStage::Variants, PipelineStage::Competitors],
            RunOptions { resume: true },
            &RunHooks::silent(),
        )
        .await;

    assert_eq!(summary.stage(PipelineStage::Variants).unwrap().status, StageStatus::Skipped);
    assert_eq!(summary.stage(PipelineStage::Competitors).unwrap().ok_count, 4);
    let mut fetched = site.fetched();
    fetched.sort();
    assert_eq!(fetched, vec![url("A2"), url("A4"), url("A5"), url("A6")]);
    assert!(site.peak_in_flight() <= 2);
    assert!(orchestrator.checkpoint_store().load().is_none());
}

#[tokio::test]
async fn lost_session_aborts_stage_and_keeps_unprocessed_items() {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    let ids = ["A1", "A2", "A3", "A4", "A5"];
    for id in ids {
        site.page(&url(id), product_page(&format!("Mug {id}"), "10", &[]));
    }
    let settings = SessionSettings {
        recycle_every: 2,
        ..sync_settings()
    };
    let orchestrator = Orchestrator::new(
        pipeline_settings(dir.path(), settings),
        FakeFactory::failing_from(site.clone(), 2),
    );

    let summary = orchestrator
        .run(&items(&ids), &ALL, RunOptions::default(), &RunHooks::silent())
        .await;

    let variants = summary.stage(PipelineStage::Variants).unwrap();
    assert_eq!(
        (variants.ok_count, variants.error_count, variants.status),
        (2, 3, StageStatus::Aborted)
    );
    assert_eq!(summary.stage(PipelineStage::Competitors).unwrap().status, StageStatus::Skipped);
    let checkpoint = orchestrator.checkpoint_store().load().unwrap();
    assert_eq!(checkpoint.stage, PipelineStage::Variants);
    assert_eq!(checkpoint.processed_ids.len(), 2);
}

#[tokio::test]
async fn browser_that_never_starts_counts_every_item_as_error() {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    let orchestrator = Orchestrator::new(
        pipeline_settings(dir.path(), sync_settings()),
        FakeFactory::failing_from(site, 1),
    );
    let summary = orchestrator
        .run(
            &items(&["A1", "A2", "A3"]),
            &[PipelineStage::Competitors],
            RunOptions::default(),
            &RunHooks::silent(),
        )
        .await;
    assert_eq!(summary.report(), "competitors: 0 ok, 3 errors (aborted)");
    assert!(orchestrator.checkpoint_store().load().is_some());
}

#[tokio::test]
async fn full_run_exports_artifacts_and_is_repeatable() {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    for (id, title) in [("A1", "Blue Mug"), ("A2", "Tea Pot"), ("A3", "Cup")] {
        site.page(&url(id), competitor_page(title, "text"));
    }
    let list = items(&["A1", "A2", "A3"]);
    let mut settings = pipeline_settings(dir.path(), sync_settings());
    settings.export.batch_size = 2;
    let orchestrator = Orchestrator::new(settings, FakeFactory::new(site));
    let stages = [PipelineStage::Competitors, PipelineStage::Export];

    let (hooks, progress) = recorded_progress();
    let first = orchestrator.run(&list, &stages, RunOptions::default(), &hooks).await;
    assert_eq!(first.report(), "competitors: 3 ok, 0 errors\nexport: 3 ok, 0 errors");
    let batch_1 = std::fs::read_to_string(dir.path().join("json/batch_1.json")).unwrap();
    let batch_2 = std::fs::read_to_string(dir.path().join("json/batch_2.json")).unwrap();
    assert_eq!(progress.lock().unwrap().last(), Some(&100));

    orchestrator
        .run(&list, &[PipelineStage::Export], RunOptions::default(), &RunHooks::silent())
        .await;
    assert_eq!(
        std::fs::read_to_string(dir.path().join("json/batch_1.json")).unwrap(),
        batch_1
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("json/batch_2.json")).unwrap(),
        batch_2
    );

    let entries: serde_json::Value = serde_json::from_str(&batch_1).unwrap();
    assert_eq!(entries[0]["id"], 1);
    assert_eq!(entries[0]["id_source"], "blue-mug");
    assert_eq!(entries[0]["h1"], "Blue Mug");
    assert_eq!(entries[1]["nom"], "cup.txt");
}
