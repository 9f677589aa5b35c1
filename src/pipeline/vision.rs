//! Vision-model fallback: rendered pages in, raw candidate rows out.
//!
//! Pages are processed concurrently through a bounded worker pool. Each
//! page climbs a timeout ladder before the stage gives up on it:
//!
//! 1. one call bounded by `api_timeout_secs`;
//! 2. on timeout, one immediate retry (`timeout-retry`);
//! 3. on a second timeout or a connection drop, the page image is split
//!    into top and bottom halves, each sent once more; the ledger gets
//!    exactly two `timeout-split` entries and halves are never split again;
//! 4. other transient errors back off through [`RetryPolicy`]; an
//!    exhausted budget records `gave-up` with zero rows.
//!
//! A page that fails never aborts the document; every terminal state is a
//! ledger entry.

use crate::config::ExtractionConfig;
use crate::debug_dump;
use crate::error::ModelError;
use crate::pipeline::encode;
use crate::pipeline::llm::{ModelReply, VisionModel};
use crate::prompts::{build_text_prompt, build_vision_prompt};
use crate::record::{PageOutcome, PageStatus, RawCandidate, TokenCounts};
use crate::retry::execute_with_retry;
use edgequake_llm::{ChatMessage, ImageData};
use futures::{stream, StreamExt};
use image::DynamicImage;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything the vision stage hands back for one document.
#[derive(Debug, Default)]
pub struct VisionOutcome {
    pub candidates: Vec<RawCandidate>,
    pub outcomes: Vec<PageOutcome>,
    pub tokens: TokenCounts,
}

/// Result of one page's trip through the ladder.
struct PageTask {
    page_number: u32,
    candidates: Vec<RawCandidate>,
    outcomes: Vec<PageOutcome>,
    tokens: TokenCounts,
}

/// Run the vision fallback over rendered page images.
pub async fn extract_pages(
    model: &Arc<dyn VisionModel>,
    pages: Vec<(u32, DynamicImage)>,
    file_name: &str,
    config: &ExtractionConfig,
) -> VisionOutcome {
    let total = pages.len();
    info!("vision stage: {} pages, concurrency {}", total, config.concurrency);

    let tasks: Vec<PageTask> = stream::iter(pages.into_iter().map(|(page_number, image)| {
        let model = Arc::clone(model);
        let config = config.clone();
        let file_name = file_name.to_string();
        async move {
            if let Some(ref cb) = config.progress {
                cb.on_page_start(page_number, total as u32);
            }
            let task = process_page(&model, page_number, image, &file_name, &config).await;
            if let Some(ref cb) = config.progress {
                match task.outcomes.last().map(|o| o.status) {
                    Some(PageStatus::Error) | Some(PageStatus::GaveUp) => {
                        let note = task
                            .outcomes
                            .last()
                            .and_then(|o| o.note.clone())
                            .unwrap_or_default();
                        cb.on_page_error(page_number, total as u32, &note);
                    }
                    _ => cb.on_page_complete(page_number, total as u32, task.candidates.len()),
                }
            }
            task
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    collect_tasks(tasks)
}

/// Run the same prompt over OCR-recovered page text, no images attached.
///
/// Text calls cannot be split, so the ladder collapses to timeout-as-
/// transient retries with backoff.
pub async fn extract_from_texts(
    model: &Arc<dyn VisionModel>,
    texts: Vec<(u32, String)>,
    file_name: &str,
    config: &ExtractionConfig,
) -> VisionOutcome {
    let total = texts.len();
    info!("OCR text stage: {} pages, concurrency {}", total, config.concurrency);

    let tasks: Vec<PageTask> = stream::iter(texts.into_iter().map(|(page_number, text)| {
        let model = Arc::clone(model);
        let config = config.clone();
        let file_name = file_name.to_string();
        async move { process_text_page(&model, page_number, &text, &file_name, &config).await }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    collect_tasks(tasks)
}

/// Sort by page and flatten, keeping each page's ledger entries together
/// and first attempts in increasing page order.
fn collect_tasks(mut tasks: Vec<PageTask>) -> VisionOutcome {
    tasks.sort_by_key(|t| t.page_number);

    let mut out = VisionOutcome::default();
    for task in tasks {
        out.candidates.extend(task.candidates);
        out.outcomes.extend(task.outcomes);
        out.tokens.merge(task.tokens);
    }
    out
}

fn guide_prompt<'a>(config: &'a ExtractionConfig, file_name: &str, page: u32) -> Option<&'a str> {
    config
        .guide
        .as_ref()
        .and_then(|g| g.prompt_for(file_name, page))
}

fn file_stem(file_name: &str) -> &str {
    std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

async fn call_model(
    model: &Arc<dyn VisionModel>,
    messages: Vec<ChatMessage>,
    timeout_secs: u64,
) -> Result<ModelReply, ModelError> {
    match tokio::time::timeout(Duration::from_secs(timeout_secs), model.complete(messages)).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::Timeout),
    }
}

fn vision_messages(prompt: &str, image: ImageData) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(prompt),
        ChatMessage::user_with_images("", vec![image]),
    ]
}

/// Climb the timeout ladder for one page image.
async fn process_page(
    model: &Arc<dyn VisionModel>,
    page_number: u32,
    image: DynamicImage,
    file_name: &str,
    config: &ExtractionConfig,
) -> PageTask {
    let prompt = build_vision_prompt(guide_prompt(config, file_name, page_number));

    let image_data = match encode::encode_page(&image) {
        Ok(data) => data,
        Err(e) => {
            warn!("page {page_number}: encode failed: {e}");
            return PageTask {
                page_number,
                candidates: Vec::new(),
                outcomes: vec![PageOutcome::new(page_number, 0, PageStatus::Error)
                    .with_note(format!("image encode: {e}"))],
                tokens: TokenCounts::default(),
            };
        }
    };

    let mut tokens = TokenCounts::default();

    let first = call_model(
        model,
        vision_messages(&prompt, image_data.clone()),
        config.api_timeout_secs,
    )
    .await;

    match first {
        Ok(reply) => {
            let candidates = accept_reply(&reply, page_number, file_name, "page", config, &mut tokens);
            PageTask {
                outcomes: vec![page_outcome(page_number, &candidates, PageStatus::Success)],
                page_number,
                candidates,
                tokens,
            }
        }
        Err(ModelError::Timeout) => {
            warn!("page {page_number}: timed out, retrying once");
            let second = call_model(
                model,
                vision_messages(&prompt, image_data),
                config.api_timeout_secs,
            )
            .await;
            match second {
                Ok(reply) => {
                    let candidates =
                        accept_reply(&reply, page_number, file_name, "page-retry", config, &mut tokens);
                    PageTask {
                        outcomes: vec![page_outcome(page_number, &candidates, PageStatus::TimeoutRetry)],
                        page_number,
                        candidates,
                        tokens,
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!("page {page_number}: still failing ({e}), splitting image");
                    split_and_process(model, page_number, &image, &prompt, file_name, config, tokens)
                        .await
                }
                Err(e) => error_task(page_number, tokens, &e),
            }
        }
        Err(e) if e.is_transient() => {
            // Connection-class errors back off instead of splitting.
            let result = execute_with_retry(
                &config.retry,
                &format!("page {page_number}"),
                ModelError::is_transient,
                || {
                    call_model(
                        model,
                        vision_messages(&prompt, image_data.clone()),
                        config.api_timeout_secs,
                    )
                },
            )
            .await;
            match result {
                Ok(reply) => {
                    let candidates =
                        accept_reply(&reply, page_number, file_name, "page", config, &mut tokens);
                    PageTask {
                        outcomes: vec![page_outcome(page_number, &candidates, PageStatus::Success)],
                        page_number,
                        candidates,
                        tokens,
                    }
                }
                Err(e) => gave_up_task(page_number, tokens, &e),
            }
        }
        Err(e) => error_task(page_number, tokens, &e),
    }
}

/// Send each half of the page once; two `timeout-split` entries, no
/// further splitting.
async fn split_and_process(
    model: &Arc<dyn VisionModel>,
    page_number: u32,
    image: &DynamicImage,
    prompt: &str,
    file_name: &str,
    config: &ExtractionConfig,
    mut tokens: TokenCounts,
) -> PageTask {
    let (top, bottom) = encode::split_page_image(image);

    let mut candidates = Vec::new();
    let mut outcomes = Vec::new();

    for (half, label) in [(top, "top half"), (bottom, "bottom half")] {
        let (half_candidates, outcome) = process_half(
            model,
            page_number,
            &half,
            label,
            prompt,
            file_name,
            config,
            &mut tokens,
        )
        .await;
        candidates.extend(half_candidates);
        outcomes.push(outcome);
    }

    PageTask {
        page_number,
        candidates,
        outcomes,
        tokens,
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_half(
    model: &Arc<dyn VisionModel>,
    page_number: u32,
    half: &DynamicImage,
    label: &str,
    prompt: &str,
    file_name: &str,
    config: &ExtractionConfig,
    tokens: &mut TokenCounts,
) -> (Vec<RawCandidate>, PageOutcome) {
    let image_data = match encode::encode_page(half) {
        Ok(data) => data,
        Err(e) => {
            return (
                Vec::new(),
                PageOutcome::new(page_number, 0, PageStatus::TimeoutSplit)
                    .with_note(format!("{label}: encode failed: {e}")),
            )
        }
    };

    let result = execute_with_retry(
        &config.retry,
        &format!("page {page_number} {label}"),
        ModelError::is_transient,
        || {
            call_model(
                model,
                vision_messages(prompt, image_data.clone()),
                config.api_timeout_secs,
            )
        },
    )
    .await;

    match result {
        Ok(reply) => {
            let dump_label = format!("page-{page_number}-{}", label.replace(' ', "-"));
            let candidates = accept_reply(&reply, page_number, file_name, &dump_label, config, tokens);
            let rows = candidates.len();
            (
                candidates,
                PageOutcome::new(page_number, rows, PageStatus::TimeoutSplit).with_note(label),
            )
        }
        Err(e) => (
            Vec::new(),
            PageOutcome::new(page_number, 0, PageStatus::TimeoutSplit)
                .with_note(format!("{label}: {e}")),
        ),
    }
}

/// OCR text goes through the same prompt contract as images.
async fn process_text_page(
    model: &Arc<dyn VisionModel>,
    page_number: u32,
    text: &str,
    file_name: &str,
    config: &ExtractionConfig,
) -> PageTask {
    let prompt = build_text_prompt(guide_prompt(config, file_name, page_number), text);
    let mut tokens = TokenCounts::default();

    let result = execute_with_retry(
        &config.retry,
        &format!("ocr page {page_number}"),
        ModelError::is_transient,
        || {
            call_model(
                model,
                // The prompt embeds the page text; the empty user turn just
                // gives the API something to respond to.
                vec![
                    ChatMessage::system(prompt.clone()),
                    ChatMessage::user_with_images("", Vec::new()),
                ],
                config.api_timeout_secs,
            )
        },
    )
    .await;

    match result {
        Ok(reply) => {
            let candidates =
                accept_reply(&reply, page_number, file_name, "ocr-page", config, &mut tokens);
            PageTask {
                outcomes: vec![page_outcome(page_number, &candidates, PageStatus::Success)],
                page_number,
                candidates,
                tokens,
            }
        }
        Err(e) if e.is_transient() => gave_up_task(page_number, tokens, &e),
        Err(e) => error_task(page_number, tokens, &e),
    }
}

fn page_outcome(page_number: u32, candidates: &[RawCandidate], success: PageStatus) -> PageOutcome {
    if candidates.is_empty() {
        PageOutcome::new(page_number, 0, PageStatus::Empty)
    } else {
        PageOutcome::new(page_number, candidates.len(), success)
    }
}

fn error_task(page_number: u32, tokens: TokenCounts, err: &ModelError) -> PageTask {
    warn!("page {page_number}: failed: {err}");
    PageTask {
        page_number,
        candidates: Vec::new(),
        outcomes: vec![
            PageOutcome::new(page_number, 0, PageStatus::Error).with_note(err.to_string()),
        ],
        tokens,
    }
}

fn gave_up_task(page_number: u32, tokens: TokenCounts, err: &ModelError) -> PageTask {
    warn!("page {page_number}: retry budget exhausted: {err}");
    PageTask {
        page_number,
        candidates: Vec::new(),
        outcomes: vec![
            PageOutcome::new(page_number, 0, PageStatus::GaveUp).with_note(err.to_string()),
        ],
        tokens,
    }
}

/// Book the reply's tokens, dump it when asked, and parse its rows.
fn accept_reply(
    reply: &ModelReply,
    page_number: u32,
    file_name: &str,
    dump_label: &str,
    config: &ExtractionConfig,
    tokens: &mut TokenCounts,
) -> Vec<RawCandidate> {
    tokens.add(reply.input_tokens, reply.output_tokens);
    if let Some(ref dir) = config.debug_dir {
        let label = if dump_label.contains(char::is_numeric) {
            dump_label.to_string()
        } else {
            format!("{dump_label}-{page_number}")
        };
        debug_dump::dump_response(dir, file_stem(file_name), &label, &reply.content);
    }
    parse_model_rows(&reply.content, page_number)
}

// ── Response parsing ─────────────────────────────────────────────────────

/// Parse product rows out of a model response.
///
/// Models wrap their JSON in code fences, prose, or a `{"products": [...]}`
/// envelope; the parser digs the first JSON payload out and tolerates both
/// the Turkish key set the prompt asks for and common English slips.
/// Rows without a description and a price are dropped.
pub fn parse_model_rows(content: &str, default_page: u32) -> Vec<RawCandidate> {
    let Some(value) = locate_json(content) else {
        debug!("page {default_page}: no JSON payload in response");
        return Vec::new();
    };

    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("products") {
            Some(Value::Array(items)) => items.clone(),
            _ => vec![Value::Object(map)],
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| candidate_from_value(item, default_page))
        .collect()
}

fn locate_json(content: &str) -> Option<Value> {
    let body = strip_code_fence(content);

    if let Ok(value) = serde_json::from_str::<Value>(body.trim()) {
        return Some(value);
    }

    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (body.find(open), body.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&body[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag on the opening fence line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.rsplit_once("```").map(|(body, _)| body).unwrap_or(rest)
}

fn field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| item.get(k))
}

fn string_field(item: &Value, keys: &[&str]) -> Option<String> {
    field(item, keys).and_then(|v| match v {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn candidate_from_value(item: &Value, default_page: u32) -> Option<RawCandidate> {
    if !item.is_object() {
        return None;
    }

    let description = string_field(item, &["Açıklama", "Aciklama", "description", "name", "product"])?;
    let price_raw = string_field(item, &["Fiyat", "price"])?;

    let page = field(item, &["Sayfa", "page"])
        .and_then(Value::as_u64)
        .map(|p| p as u32)
        .unwrap_or(default_page);

    Some(RawCandidate {
        code: string_field(item, &["Malzeme_Kodu", "Kod", "code"]),
        short_code: string_field(item, &["Kisa_Kod", "short_code"]),
        description,
        price_raw,
        currency: string_field(item, &["Para_Birimi", "currency"]),
        page: Some(page),
        section: string_field(item, &["Ana_Baslik", "section"]),
        subsection: string_field(item, &["Alt_Baslik", "subsection"]),
        year: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_turkish_keys() {
        let content = r#"[
            {"Malzeme_Kodu": "AB-1", "Açıklama": "Kelebek vana", "Fiyat": "1.250,00",
             "Para_Birimi": "EUR", "Ana_Baslik": "Vanalar", "Sayfa": 7}
        ]"#;
        let rows = parse_model_rows(content, 3);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code.as_deref(), Some("AB-1"));
        assert_eq!(rows[0].price_raw, "1.250,00");
        assert_eq!(rows[0].page, Some(7));
        assert_eq!(rows[0].section.as_deref(), Some("Vanalar"));
    }

    #[test]
    fn parses_english_keys_and_numeric_price() {
        let content = r#"[{"code": "X-9", "description": "Valve", "price": 1000.5}]"#;
        let rows = parse_model_rows(content, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price_raw, "1000.5");
        assert_eq!(rows[0].page, Some(2));
    }

    #[test]
    fn digs_json_out_of_fences_and_prose() {
        let content = "Here is the extraction:\n```json\n[{\"Açıklama\": \"Vana\", \"Fiyat\": \"10,00\"}]\n```\nDone.";
        let rows = parse_model_rows(content, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "Vana");
    }

    #[test]
    fn unwraps_products_envelope() {
        let content = r#"{"products": [{"Açıklama": "Vana", "Fiyat": "10,00"}]}"#;
        assert_eq!(parse_model_rows(content, 1).len(), 1);
    }

    #[test]
    fn single_object_is_one_row() {
        let content = r#"{"Açıklama": "Vana", "Fiyat": "10,00"}"#;
        assert_eq!(parse_model_rows(content, 1).len(), 1);
    }

    #[test]
    fn rows_without_description_or_price_are_dropped() {
        let content = r#"[
            {"Açıklama": "Vana"},
            {"Fiyat": "10,00"},
            {"Açıklama": "", "Fiyat": "10,00"},
            {"Açıklama": "Boru", "Fiyat": "5,00"}
        ]"#;
        let rows = parse_model_rows(content, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "Boru");
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_model_rows("I could not read the page.", 1).is_empty());
        assert!(parse_model_rows("", 1).is_empty());
    }
}
