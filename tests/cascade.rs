//! End-to-end behaviour of the fallback ladder, the structured path, and
//! the master merge, driven through scripted model doubles.

use fiyatex::extract::sheet::{candidates_from_sheets, SheetData};
use fiyatex::normalize::normalize_records;
use fiyatex::pipeline::vision::{extract_from_texts, extract_pages};
use fiyatex::{
    ExtractionConfig, MasterStore, MergeMode, ModelError, ModelReply, PageStatus, PriceStyle,
    RetryPolicy, VisionModel,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replays a fixed script of replies, one per model call.
struct ScriptedModel {
    script: Mutex<Vec<Result<ModelReply, ModelError>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(script: Vec<Result<ModelReply, ModelError>>) -> Arc<dyn VisionModel> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    fn reply(rows_json: &str) -> Result<ModelReply, ModelError> {
        Ok(ModelReply {
            content: rows_json.to_string(),
            input_tokens: 100,
            output_tokens: 50,
        })
    }
}

impl VisionModel for ScriptedModel {
    fn complete(
        &self,
        _messages: Vec<edgequake_llm::ChatMessage>,
    ) -> BoxFuture<'_, Result<ModelReply, ModelError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Err(ModelError::Api("script exhausted".into()))
            } else {
                script.remove(0)
            }
        }
        .boxed()
    }
}

fn page() -> (u32, DynamicImage) {
    (
        1,
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 60, Rgba([255, 255, 255, 255]))),
    )
}

fn fast_config() -> ExtractionConfig {
    let mut config = ExtractionConfig::builder()
        .concurrency(1)
        .retry(RetryPolicy {
            max_retries: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 2,
        })
        .build()
        .unwrap();
    config.api_timeout_secs = 5;
    config
}

#[tokio::test]
async fn second_timeout_splits_into_exactly_two_ledger_entries() {
    let model = ScriptedModel::new(vec![
        Err(ModelError::Timeout),
        Err(ModelError::Timeout),
        ScriptedModel::reply(r#"[{"Açıklama": "Üst vana", "Fiyat": "10,00"}]"#),
        ScriptedModel::reply(
            r#"[{"Açıklama": "Alt vana", "Fiyat": "20,00"},
                {"Açıklama": "Alt boru", "Fiyat": "30,00"}]"#,
        ),
    ]);

    let out = extract_pages(&model, vec![page()], "liste.pdf", &fast_config()).await;

    assert_eq!(out.outcomes.len(), 2, "one entry per half, nothing else");
    assert!(out
        .outcomes
        .iter()
        .all(|o| o.status == PageStatus::TimeoutSplit && o.page_number == 1));
    assert_eq!(out.outcomes[0].note.as_deref(), Some("top half"));
    assert_eq!(out.outcomes[1].note.as_deref(), Some("bottom half"));
    assert_eq!(out.outcomes[0].rows, 1);
    assert_eq!(out.outcomes[1].rows, 2);
    assert_eq!(out.candidates.len(), 3);
    assert_eq!(out.tokens.input_tokens, 200);
}

#[tokio::test]
async fn halves_are_never_split_again() {
    // Both halves keep timing out; the retry budget drains but the ledger
    // still shows exactly two split entries with zero rows.
    let model = ScriptedModel::new(vec![Err(ModelError::Timeout); 10]);

    let out = extract_pages(&model, vec![page()], "liste.pdf", &fast_config()).await;

    assert_eq!(out.outcomes.len(), 2);
    assert!(out.outcomes.iter().all(|o| o.status == PageStatus::TimeoutSplit && o.rows == 0));
    assert!(out.candidates.is_empty());
}

#[tokio::test]
async fn timeout_then_success_is_a_timeout_retry() {
    let model = ScriptedModel::new(vec![
        Err(ModelError::Timeout),
        ScriptedModel::reply(r#"[{"Açıklama": "Vana", "Fiyat": "10,00"}]"#),
    ]);

    let out = extract_pages(&model, vec![page()], "liste.pdf", &fast_config()).await;

    assert_eq!(out.outcomes.len(), 1);
    assert_eq!(out.outcomes[0].status, PageStatus::TimeoutRetry);
    assert_eq!(out.candidates.len(), 1);
}

#[tokio::test]
async fn connection_errors_exhaust_into_gave_up() {
    let model = ScriptedModel::new(vec![Err(ModelError::Connection("reset".into())); 6]);

    let out = extract_pages(&model, vec![page()], "liste.pdf", &fast_config()).await;

    assert_eq!(out.outcomes.len(), 1);
    assert_eq!(out.outcomes[0].status, PageStatus::GaveUp);
    assert_eq!(out.outcomes[0].rows, 0);
}

#[tokio::test]
async fn api_errors_are_terminal_for_the_page() {
    let model = ScriptedModel::new(vec![Err(ModelError::Api("invalid api key".into()))]);

    let out = extract_pages(&model, vec![page()], "liste.pdf", &fast_config()).await;

    assert_eq!(out.outcomes.len(), 1);
    assert_eq!(out.outcomes[0].status, PageStatus::Error);
}

#[tokio::test]
async fn ledger_first_attempts_stay_in_page_order() {
    let model = ScriptedModel::new(vec![
        ScriptedModel::reply(r#"[{"Açıklama": "A", "Fiyat": "1,00"}]"#),
        ScriptedModel::reply(r#"[{"Açıklama": "B", "Fiyat": "2,00"}]"#),
        ScriptedModel::reply(r#"[{"Açıklama": "C", "Fiyat": "3,00"}]"#),
    ]);
    let pages = vec![
        page(),
        (2, page().1.clone()),
        (3, page().1),
    ];

    let mut config = fast_config();
    config.concurrency = 3;
    let out = extract_pages(&model, pages, "liste.pdf", &config).await;

    let order: Vec<u32> = out.outcomes.iter().map(|o| o.page_number).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test]
async fn ocr_text_flows_through_the_model_path() {
    let model = ScriptedModel::new(vec![ScriptedModel::reply(
        r#"[{"Malzeme_Kodu": "AB-1", "Açıklama": "Vana", "Fiyat": "10,00"}]"#,
    )]);

    let texts = vec![(1, "AB-1 Vana 10,00".to_string())];
    let out = extract_from_texts(&model, texts, "tarama.pdf", &fast_config()).await;

    assert_eq!(out.candidates.len(), 1);
    assert_eq!(out.candidates[0].code.as_deref(), Some("AB-1"));
    assert_eq!(out.outcomes[0].status, PageStatus::Success);
}

#[test]
fn structured_sheets_become_canonical_records() {
    let sheets = vec![
        SheetData {
            name: "Meyveler".into(),
            rows: vec![
                vec!["Ürün Adı".into(), "Fiyat".into()],
                vec!["Elma".into(), "1.000,50".into()],
            ],
        },
        SheetData {
            name: "Notlar".into(),
            rows: vec![vec!["sadece açıklama metni".into()]],
        },
    ];

    let candidates = candidates_from_sheets(&sheets);
    let records = normalize_records(candidates, "Manav_Fiyat_2024.xlsx", "TRY", PriceStyle::Eu);

    assert_eq!(records.len(), 1);
    let rec = &records[0];
    assert_eq!(rec.description, "Elma");
    assert_eq!(rec.price.to_string(), "1000.50");
    assert_eq!(rec.currency, "TRY");
    assert_eq!(rec.source_file, "Manav_Fiyat_2024.xlsx");
    assert_eq!(rec.source_page, Some(1));
    assert_eq!(rec.record_code, "Manav_Fiyat_2024|1|1");
}

#[test]
fn extraction_then_update_merge_supersedes_prior_import() {
    let dir = tempfile::tempdir().unwrap();
    let store = MasterStore::new(dir.path().join("master.csv"), dir.path().join("master.db"));

    let first = {
        let sheets = vec![SheetData {
            name: "Fiyatlar".into(),
            rows: vec![
                vec!["Ürün Adı".into(), "Fiyat".into()],
                vec!["Elma".into(), "1.000,50".into()],
            ],
        }];
        normalize_records(
            candidates_from_sheets(&sheets),
            "Manav_Fiyat_2024.xlsx",
            "TRY",
            PriceStyle::Eu,
        )
    };
    store.merge(&first, MergeMode::Update).unwrap();

    let second = {
        let sheets = vec![SheetData {
            name: "Fiyatlar".into(),
            rows: vec![
                vec!["Ürün Adı".into(), "Fiyat".into()],
                vec!["Elma".into(), "1.100,00".into()],
                vec!["Armut".into(), "900,00".into()],
            ],
        }];
        normalize_records(
            candidates_from_sheets(&sheets),
            "Manav_Fiyat_2024.xlsx",
            "TRY",
            PriceStyle::Eu,
        )
    };
    let report = store.merge(&second, MergeMode::Update).unwrap();

    assert_eq!(report.removed, 1, "same source file supersedes");
    assert_eq!(report.total, 2);
    let rows = store.load_existing().unwrap();
    assert!(rows.iter().any(|r| r.description == "Armut"));
    assert!(rows
        .iter()
        .all(|r| r.description != "Elma" || r.price.to_string() == "1100.00"));
}
