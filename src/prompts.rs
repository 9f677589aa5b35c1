//! Prompt templates for the vision and OCR extraction stages.
//!
//! Centralising every prompt here keeps the request-building code in
//! `pipeline/vision.rs` free of prompt engineering, and lets unit tests
//! inspect the assembled text without a live model.

/// Default instruction for extracting price rows from a page image.
///
/// Written in Turkish because the target corpus is Turkish vendor price
/// lists; models follow the schema more reliably when the instruction
/// language matches the document language. The response contract is the
/// JSON array described in the closing section.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Sen bir fiyat listesi analiz asistanısın. Görevin, sayfadaki ürün satırlarını ve üst başlıklarını eksiksiz ve yapısal şekilde çıkarmaktır.

Kurallar:

1. Sadece gerçek ürün satırlarını çıkart. Tablo başlıklarını, alt başlıkları ve genel açıklamaları veri satırı olarak alma.
2. Her ürün satırı için şu alanları ayrıştır:
   - Malzeme_Kodu (varsa)
   - Açıklama (ürün adı/özellikleri)
   - Fiyat (sayfada yazıldığı haliyle, örn. "1.250,00")
   - Para_Birimi (yoksa "TL" yaz)
   - Ana_Baslik (satırın bağlı olduğu ana başlık, varsa)
   - Alt_Baslik (varsa)
3. Olmayan bir değeri uydurma; alanı boş bırak.
4. Fiyatı sayıya çevirmeye çalışma, metin olarak aktar.

Çıktı formatı: yalnızca bir JSON dizisi döndür, başka açıklama ekleme.

Örnek:
[
  {
    "Malzeme_Kodu": "3MAS 80MA2",
    "Açıklama": "0.55 KW",
    "Fiyat": "110,00",
    "Para_Birimi": "USD",
    "Ana_Baslik": "ASENKRON ELEKTRİK MOTORLARI",
    "Alt_Baslik": "3000 d/dak"
  }
]"#;

/// Assemble the prompt for a page image, splicing in a guide override.
///
/// The guide text goes first so document-specific instructions take
/// precedence over the generic rules when they disagree.
pub fn build_vision_prompt(guide_override: Option<&str>) -> String {
    match guide_override {
        Some(custom) if !custom.trim().is_empty() => {
            format!(
                "{}\n\nBu dosyaya özel talimat:\n{}",
                DEFAULT_EXTRACTION_PROMPT,
                custom.trim()
            )
        }
        _ => DEFAULT_EXTRACTION_PROMPT.to_string(),
    }
}

/// Assemble the prompt for OCR-recovered text instead of an image.
///
/// Same contract as the vision prompt; the page text rides along as a
/// fenced block since there is no image attachment to read from.
pub fn build_text_prompt(guide_override: Option<&str>, page_text: &str) -> String {
    format!(
        "{}\n\nSayfa metni:\n\"\"\"\n{}\n\"\"\"",
        build_vision_prompt(guide_override),
        page_text.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_requests_json_array() {
        assert!(DEFAULT_EXTRACTION_PROMPT.contains("JSON dizisi"));
        assert!(DEFAULT_EXTRACTION_PROMPT.contains("Malzeme_Kodu"));
        assert!(DEFAULT_EXTRACTION_PROMPT.contains("Para_Birimi"));
    }

    #[test]
    fn guide_override_is_spliced() {
        let prompt = build_vision_prompt(Some("Fiyatlar her zaman EUR."));
        assert!(prompt.starts_with(DEFAULT_EXTRACTION_PROMPT));
        assert!(prompt.contains("Fiyatlar her zaman EUR."));
        assert_eq!(build_vision_prompt(Some("   ")), DEFAULT_EXTRACTION_PROMPT);
        assert_eq!(build_vision_prompt(None), DEFAULT_EXTRACTION_PROMPT);
    }

    #[test]
    fn text_prompt_embeds_page_text() {
        let prompt = build_text_prompt(None, "ABC-1  12,50 TL\n");
        assert!(prompt.contains("ABC-1  12,50 TL"));
        assert!(prompt.contains("Sayfa metni"));
    }
}
