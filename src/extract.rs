//! Extraction-method selection: native text first, OCR fallback per page.
//!
//! Input is raw document bytes plus the file type declared at upload. Output
//! is the ordered page list (plus any detected tables) and the per-document
//! extraction method:
//!
//! - PDFs are extracted natively page by page. A page whose trimmed text falls
//!   below the configured character density threshold is treated as scanned
//!   and re-run through the OCR capability for that page only.
//! - Plain text (`.txt`, `.md`) is one native page.
//! - Images are one OCR page.
//!
//! Per-document method: `text` when every page extracted natively, `ocr` when
//! every page was OCR'd, `mixed` otherwise. Extraction has no side effects;
//! persistence is the caller's job.

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::models::{ExtractionMethod, FileType, Page};
use crate::ocr::OcrEngine;

/// Pages produced by extraction, with the overall method and detected tables.
#[derive(Debug)]
pub struct Extracted {
    pub pages: Vec<Page>,
    pub method: ExtractionMethod,
    /// `(page_index, rows)` for each detected table.
    pub tables: Vec<(i64, Vec<Vec<String>>)>,
}

/// Turn raw bytes into ordered pages.
pub async fn extract_pages(
    bytes: &[u8],
    file_type: Option<FileType>,
    filename: &str,
    config: &ExtractionConfig,
    ocr: &dyn OcrEngine,
    ocr_language: &str,
) -> Result<Extracted, ExtractionError> {
    let file_type = file_type.ok_or_else(|| {
        ExtractionError::UnsupportedFormat(filename.to_string())
    })?;

    match file_type {
        FileType::Pdf => extract_pdf(bytes, config, ocr, ocr_language).await,
        FileType::PlainText => extract_plain_text(bytes),
        FileType::Image => extract_image(bytes, ocr, ocr_language).await,
    }
}

async fn extract_pdf(
    bytes: &[u8],
    config: &ExtractionConfig,
    ocr: &dyn OcrEngine,
    ocr_language: &str,
) -> Result<Extracted, ExtractionError> {
    let native_pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractionError::CorruptInput(format!("PDF parse failed: {}", e)))?;

    if native_pages.is_empty() {
        return Err(ExtractionError::CorruptInput(
            "PDF contains no pages".into(),
        ));
    }

    let (pages, method) = assemble_pdf_pages(bytes, native_pages, config, ocr, ocr_language).await?;

    let tables = collect_tables(&pages);
    Ok(Extracted {
        pages,
        method,
        tables,
    })
}

/// Apply the per-page density threshold to natively extracted page text,
/// re-running low-density pages through OCR, and aggregate the per-document
/// extraction method.
async fn assemble_pdf_pages(
    bytes: &[u8],
    native_pages: Vec<String>,
    config: &ExtractionConfig,
    ocr: &dyn OcrEngine,
    ocr_language: &str,
) -> Result<(Vec<Page>, ExtractionMethod), ExtractionError> {
    let mut pages = Vec::with_capacity(native_pages.len());
    let mut any_native = false;
    let mut any_ocr = false;

    for (i, native_text) in native_pages.into_iter().enumerate() {
        let index = i as i64;
        let density = native_text.trim().chars().count();

        let (text, method) = if density < config.min_chars_per_page {
            // Scanned-page signal: too little extractable text.
            let recognized = ocr.recognize(bytes, index, ocr_language).await?;
            any_ocr = true;
            (recognized, ExtractionMethod::Ocr)
        } else {
            any_native = true;
            (native_text, ExtractionMethod::Text)
        };

        let has_table = !detect_tables(&text).is_empty();
        pages.push(Page {
            index,
            text,
            method,
            has_table,
        });
    }

    let method = match (any_native, any_ocr) {
        (true, false) => ExtractionMethod::Text,
        (false, true) => ExtractionMethod::Ocr,
        _ => ExtractionMethod::Mixed,
    };

    Ok((pages, method))
}

fn extract_plain_text(bytes: &[u8]) -> Result<Extracted, ExtractionError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ExtractionError::CorruptInput(format!("invalid UTF-8: {}", e)))?
        .to_string();

    let has_table = !detect_tables(&text).is_empty();
    let pages = vec![Page {
        index: 0,
        text,
        method: ExtractionMethod::Text,
        has_table,
    }];

    let tables = collect_tables(&pages);
    Ok(Extracted {
        pages,
        method: ExtractionMethod::Text,
        tables,
    })
}

async fn extract_image(
    bytes: &[u8],
    ocr: &dyn OcrEngine,
    ocr_language: &str,
) -> Result<Extracted, ExtractionError> {
    let text = ocr.recognize(bytes, 0, ocr_language).await?;

    let has_table = !detect_tables(&text).is_empty();
    let pages = vec![Page {
        index: 0,
        text,
        method: ExtractionMethod::Ocr,
        has_table,
    }];

    let tables = collect_tables(&pages);
    Ok(Extracted {
        pages,
        method: ExtractionMethod::Ocr,
        tables,
    })
}

fn collect_tables(pages: &[Page]) -> Vec<(i64, Vec<Vec<String>>)> {
    let mut out = Vec::new();
    for page in pages {
        for rows in detect_tables(&page.text) {
            out.push((page.index, rows));
        }
    }
    out
}

// ============ Table detection ============

/// Detect tabular structure in page text.
///
/// A table is two or more consecutive lines that each split into two or more
/// cells on `|` or tab delimiters. Markdown separator rows (`|---|---|`) are
/// dropped from the output.
pub fn detect_tables(text: &str) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        match table_row(line) {
            Some(cells) => run.push(cells),
            None => {
                flush_run(&mut run, &mut tables);
            }
        }
    }
    flush_run(&mut run, &mut tables);

    tables
}

fn flush_run(run: &mut Vec<Vec<String>>, tables: &mut Vec<Vec<Vec<String>>>) {
    let rows: Vec<Vec<String>> = run.drain(..).filter(|r| !is_separator_row(r)).collect();
    if rows.len() >= 2 {
        tables.push(rows);
    }
}

fn table_row(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cells: Vec<String> = if trimmed.contains('|') {
        trimmed
            .trim_matches('|')
            .split('|')
            .map(|c| c.trim().to_string())
            .collect()
    } else if trimmed.contains('\t') {
        trimmed.split('\t').map(|c| c.trim().to_string()).collect()
    } else {
        return None;
    };

    if cells.len() >= 2 {
        Some(cells)
    } else {
        None
    }
}

fn is_separator_row(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | '=')))
}
