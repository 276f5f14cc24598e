//! hOCR rendering.
//!
//! Produces the subset of hOCR callers depend on: one `ocr_page` holding
//! `ocr_line` spans, each holding `ocrx_word` spans. Every element carries a
//! `bbox`; words also carry `x_wconf` (confidence as a percentage).

use std::fmt::Write;

use crate::engine::{IntRect, TextItem, END_OF_LINE, START_OF_LINE};

/// Render recognized words on a `width` x `height` page.
///
/// Lines are split on the words' line flags; a word flagged
/// [`START_OF_LINE`] opens a new line even if the previous one was not
/// closed with [`END_OF_LINE`].
pub fn render(width: i32, height: i32, words: &[TextItem]) -> String {
    let mut out = String::new();
    let page = IntRect::new(0, 0, width, height);
    let _ = writeln!(
        out,
        "<div class='ocr_page' id='page_1' title='image;{}'>",
        bbox(&page)
    );

    for (line_index, line) in split_lines(words).iter().enumerate() {
        let line_no = line_index + 1;
        let Some(line_rect) = line.iter().map(|w| w.rect).reduce(|a, b| a.union(&b)) else {
            continue;
        };
        let _ = writeln!(
            out,
            " <span class='ocr_line' id='line_1_{}' title='{}'>",
            line_no,
            bbox(&line_rect)
        );
        for (word_index, word) in line.iter().enumerate() {
            let _ = writeln!(
                out,
                "  <span class='ocrx_word' id='word_1_{}_{}' title='{}; x_wconf {}'>{}</span>",
                line_no,
                word_index + 1,
                bbox(&word.rect),
                (word.confidence.clamp(0.0, 1.0) * 100.0).round() as u32,
                escape(&word.text)
            );
        }
        out.push_str(" </span>\n");
    }

    out.push_str("</div>\n");
    out
}

fn bbox(rect: &IntRect) -> String {
    format!(
        "bbox {} {} {} {}",
        rect.left, rect.top, rect.right, rect.bottom
    )
}

fn split_lines(words: &[TextItem]) -> Vec<Vec<&TextItem>> {
    let mut lines: Vec<Vec<&TextItem>> = Vec::new();
    let mut current: Vec<&TextItem> = Vec::new();
    for word in words {
        if word.flags & START_OF_LINE != 0 && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        current.push(word);
        if word.flags & END_OF_LINE != 0 {
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Escape text for HTML element content.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, rect: IntRect, flags: u32, confidence: f32) -> TextItem {
        TextItem {
            rect,
            flags,
            confidence,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_render_groups_words_into_lines() {
        let words = vec![
            word("Hello", IntRect::new(10, 10, 60, 30), START_OF_LINE, 0.96),
            word("world", IntRect::new(70, 12, 120, 32), END_OF_LINE, 0.9),
            word("Bye", IntRect::new(10, 50, 40, 70), START_OF_LINE | END_OF_LINE, 0.5),
        ];
        let html = render(200, 100, &words);

        assert!(html.starts_with("<div class='ocr_page' id='page_1' title='image;bbox 0 0 200 100'>"));
        assert_eq!(html.matches("class='ocr_line'").count(), 2);
        assert_eq!(html.matches("class='ocrx_word'").count(), 3);
        assert!(html.contains("id='line_1_1' title='bbox 10 10 120 32'"));
        assert!(html.contains("title='bbox 10 10 60 30; x_wconf 96'>Hello</span>"));
        assert!(html.contains("id='word_1_2_1' title='bbox 10 50 40 70; x_wconf 50'>Bye</span>"));
    }

    #[test]
    fn test_render_escapes_word_text() {
        let words = vec![word(
            "<a&b>",
            IntRect::new(0, 0, 5, 5),
            START_OF_LINE | END_OF_LINE,
            1.0,
        )];
        let html = render(5, 5, &words);
        assert!(html.contains(">&lt;a&amp;b&gt;</span>"));
    }

    #[test]
    fn test_render_empty_page() {
        let html = render(8, 8, &[]);
        assert!(!html.contains("ocr_line"));
        assert!(html.trim_end().ends_with("</div>"));
    }
}
