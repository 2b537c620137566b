//! Turning generated story text into pages and panel prompts.

/// Split story text into at most `page_count` pages.
///
/// Paragraphs (blank-line separated) are pages. Leading "Page N:" labels
/// are dropped. Surplus paragraphs are merged into the preceding pages so
/// no text is lost; a short story yields fewer pages.
pub fn split_pages(story: &str, page_count: usize) -> Vec<String> {
    let paragraphs: Vec<String> = story
        .replace("\r\n", "\n")
        .split("\n\n")
        .map(strip_page_label)
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect();

    if page_count == 0 || paragraphs.len() <= page_count {
        return paragraphs;
    }

    let mut pages = Vec::with_capacity(page_count);
    let total = paragraphs.len();
    let mut start = 0;
    for page in 0..page_count {
        let end = (page + 1) * total / page_count;
        pages.push(paragraphs[start..end].join(" "));
        start = end;
    }
    pages
}

fn strip_page_label(paragraph: &str) -> &str {
    let trimmed = paragraph.trim();
    let lower = trimmed.to_ascii_lowercase();
    if !lower.starts_with("page ") {
        return trimmed;
    }
    match trimmed.find(':') {
        Some(idx) if trimmed[5..idx].trim().chars().all(|c| c.is_ascii_digit()) => {
            trimmed[idx + 1..].trim()
        }
        _ => trimmed,
    }
}

/// Break one page of text into `panels` scene prompts.
///
/// Sentences are distributed over the panels in order. With fewer
/// sentences than panels the whole page is reused with a beat marker.
pub fn panel_prompts(page_text: &str, panels: usize) -> Vec<String> {
    let panels = panels.max(1);
    if panels == 1 {
        return vec![page_text.trim().to_string()];
    }

    let sentences = split_sentences(page_text);
    if sentences.len() < panels {
        return (1..=panels)
            .map(|beat| format!("{} (moment {} of {})", page_text.trim(), beat, panels))
            .collect();
    }

    let total = sentences.len();
    let mut start = 0;
    (0..panels)
        .map(|panel| {
            let end = (panel + 1) * total / panels;
            let prompt = sentences[start..end].join(" ");
            start = end;
            prompt
        })
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}
