//! Readability-style extraction of article text from an HTML page.

use scraper::{Html, Selector};

/// Tags whose subtrees never contain article prose.
const NOISE_SELECTOR: &str = "script, style, nav, header, footer, aside, noscript, svg, form";

/// Extract the main article text from an HTML document. Prefers the
/// `<article>`/`<main>` subtree when present, falling back to the whole
/// body. Returns None when nothing substantial survives.
pub fn extract_article_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for container in ["article", "main", "div[role=\"main\"]", "body"] {
        let Ok(selector) = Selector::parse(container) else {
            continue;
        };
        if let Some(root) = document.select(&selector).next() {
            let text = collect_text(&document, root);
            if text.split_whitespace().count() >= 40 {
                return Some(text);
            }
        }
    }
    None
}

fn collect_text(document: &Html, root: scraper::ElementRef<'_>) -> String {
    let noise = Selector::parse(NOISE_SELECTOR).expect("static selector");
    let noisy_ids: std::collections::HashSet<_> =
        document.select(&noise).map(|el| el.id()).collect();

    let block = Selector::parse("p, h1, h2, h3, h4, h5, h6, li, pre, blockquote, td")
        .expect("static selector");

    let mut paragraphs: Vec<String> = Vec::new();
    for element in root.select(&block) {
        // Skip blocks living under stripped containers.
        let mut ancestor_noisy = false;
        let mut node = element.parent();
        while let Some(parent) = node {
            if noisy_ids.contains(&parent.id()) {
                ancestor_noisy = true;
                break;
            }
            node = parent.parent();
        }
        if ancestor_noisy {
            continue;
        }

        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }

    // Nested block elements produce duplicate fragments (li inside li,
    // p inside blockquote); drop exact repeats.
    paragraphs.dedup();
    paragraphs.join("\n\n")
}
