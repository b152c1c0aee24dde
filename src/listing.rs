use super::*;

const LISTING_HREF_CHARS: usize = 1024;

/// Display index -> URL for the last listing shown in a chat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(super) struct ListingCache {
    urls: Vec<String>,
}

impl ListingCache {
    pub(super) fn len(&self) -> usize {
        self.urls.len()
    }

    /// `index` is 1-based, as shown to the user.
    pub(super) fn resolve(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|index| self.urls.get(index))
            .map(String::as_str)
    }
}

/// A rendered listing ready to send, plus how many links it enumerates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Listing {
    pub(super) text: String,
    pub(super) count: usize,
}

/// Renders `links` as a numbered HTML list in store order. Entries that would push the
/// message past the size ceiling are left out and counted in a trailing marker; the
/// returned cache still covers every link.
pub(super) fn render_listing(links: &LinkMap, header: &str, footer: &str) -> (Listing, ListingCache) {
    let blocks: Vec<String> = links
        .iter()
        .enumerate()
        .map(|(idx, record)| build_listing_entry(idx + 1, record))
        .collect();
    let budget = MESSAGE_CHAR_LIMIT
        .saturating_sub(header.chars().count())
        .saturating_sub(footer.chars().count() + 2);
    let body = bounded_join(&blocks, budget, "links");

    let text = format!("{}\n\n{}{}", header, body, footer);
    let cache = ListingCache {
        urls: links.iter().map(|record| record.url.clone()).collect(),
    };
    (
        Listing {
            text,
            count: links.len(),
        },
        cache,
    )
}

fn build_listing_entry(index: usize, record: &LinkRecord) -> String {
    let title = truncate_chars(record.display_title(), TITLE_DISPLAY_CHARS);
    let href = escape_html(&record.url);
    // Oversized hrefs are listed without an anchor; the details view still links them.
    let mut entry = if href.chars().count() > LISTING_HREF_CHARS {
        format!("{}. {}\n", index, escape_html(&title))
    } else {
        format!("{}. <a href=\"{}\">{}</a>\n", index, href, escape_html(&title))
    };
    let description = record.metadata.description.trim();
    if !description.is_empty() {
        let description = truncate_chars(description, DESCRIPTION_DISPLAY_CHARS);
        entry.push_str(&format!("<i>{}</i>\n", escape_html(&description)));
    }
    entry.push('\n');
    entry
}

/// Joins whole blocks while they fit in `budget` characters. Whatever does not fit is
/// summarized as "(N more <noun> not shown)" rather than dropped silently.
pub(super) fn bounded_join(blocks: &[String], budget: usize, noun: &str) -> String {
    const MARKER_RESERVE: usize = 48;
    let mut out = String::new();
    let mut used = 0usize;
    for (shown, block) in blocks.iter().enumerate() {
        let len = block.chars().count();
        let remaining_after = blocks.len() - shown - 1;
        let reserve = if remaining_after > 0 { MARKER_RESERVE } else { 0 };
        if used + len + reserve > budget {
            let hidden = blocks.len() - shown;
            out.push_str(&format!("<i>({} more {} not shown)</i>\n\n", hidden, noun));
            return out;
        }
        out.push_str(block);
        used += len;
    }
    out
}

pub(super) fn build_link_details(index: usize, record: &LinkRecord) -> String {
    let description = record.metadata.description.trim();
    let description = if description.is_empty() {
        "-".to_string()
    } else {
        escape_html(description)
    };
    format!(
        "<b>🔗 Link Details #{}</b>\n\n<b>Title:</b> {}\n\n<b>Description:</b> <i>{}</i>\n\n<b>URL:</b> <a href=\"{}\">{}</a>",
        index,
        escape_html(record.display_title()),
        description,
        escape_html(&record.url),
        escape_html(&record.url)
    )
}

/// Cuts `text` to at most `max` characters, marking the cut with "...".
pub(super) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

pub(super) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
