use std::io::Write;
use std::path::Path;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::commands::{connect, truncate};
use crate::database::repo::{BookRecord, Cache};
use crate::library::RemoteBook;
use crate::scrape::fetcher::{self, BrowserFetcher, PageSource};
use crate::source::Source;
use crate::utils::config::Config;

const TAG_CATEGORY: &str = "trope";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub found: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Mirrors the BookLore book list into the cache. Scrape state already in
/// the cache is kept.
pub fn sync_books_to_cache(cache: &Cache, books: &[RemoteBook]) -> Result<usize> {
    for book in books {
        let author = book.primary_author().unwrap_or("Unknown");
        let isbn = book
            .isbn13
            .as_deref()
            .or(book.isbn.as_deref())
            .or(book.isbn10.as_deref());
        cache.upsert_book(book.id, book.title(), author, isbn)?;
    }
    Ok(books.len())
}

/// Searches, scrapes and stores one book. Returns false when the site has
/// no match for it.
fn scrape_book(cache: &Cache, pages: &mut dyn PageSource, source: Source, book: &BookRecord) -> Result<bool> {
    let base_url = source.base_url();
    let Some(hit) = fetcher::search(pages, base_url, &book.title, &book.author) else {
        return Ok(false);
    };

    let metadata = fetcher::scrape(pages, base_url, &hit.external_id, &hit.slug)?;
    for tag in &metadata.tags {
        let tag_id = cache.get_or_create_tag(tag, TAG_CATEGORY, source.key())?;
        cache.add_book_tag(book.id, tag_id)?;
    }
    if let Some(level) = metadata.intensity_level {
        cache.set_intensity(book.id, level, metadata.intensity_label.as_deref())?;
    }
    cache.mark_scraped(book.id, source, &hit.external_id)?;
    Ok(true)
}

/// Enriches `books` from one site. A failure on one book is logged and
/// counted; the batch carries on.
pub fn scrape_source(
    cache: &Cache,
    pages: &mut dyn PageSource,
    source: Source,
    books: &[BookRecord],
    progress: &ProgressBar,
) -> ScrapeSummary {
    let mut summary = ScrapeSummary::default();

    for book in books {
        progress.set_message(truncate(&book.title, 40));
        match scrape_book(cache, pages, source, book) {
            Ok(true) => summary.found += 1,
            Ok(false) => {
                info!("No {} match for '{}'", source, book.title);
                summary.skipped += 1;
            }
            Err(e) => {
                warn!("Error scraping '{}' from {}: {:#}", book.title, source, e);
                summary.failed += 1;
            }
        }
        progress.inc(1);
    }

    summary
}

fn progress_bar(len: usize, source: Source) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{prefix:>12} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style.progress_chars("=> "));
    bar.set_prefix(source.key());
    bar
}

pub fn run(
    config: &Config,
    db_path: &Path,
    sources: &[Source],
    limit: Option<usize>,
    out: &mut dyn Write,
) -> Result<()> {
    let cache = Cache::open(db_path)?;
    let client = connect(config)?;

    writeln!(out, "Syncing book list to local cache...")?;
    let books = client.get_books(false)?;
    let synced = sync_books_to_cache(&cache, &books)?;
    writeln!(out, "  Synced {} books.", synced)?;

    let mut work = Vec::new();
    for &source in sources {
        let mut unscraped = cache.unscraped_books(source)?;
        if let Some(limit) = limit {
            unscraped.truncate(limit);
        }
        if unscraped.is_empty() {
            writeln!(out, "  No unscraped books for {}.", source)?;
        } else {
            work.push((source, unscraped));
        }
    }
    if work.is_empty() {
        return Ok(());
    }

    if config.scraping.max_concurrent > 1 {
        warn!(
            "max_concurrent = {} ignored; pages are fetched one at a time",
            config.scraping.max_concurrent
        );
    }

    // One browser session for the whole run, closed when `fetcher` drops.
    let mut fetcher = BrowserFetcher::launch(&config.scraping)?;
    for (source, books) in work {
        writeln!(out, "\nScraping {} books from {}...", books.len(), source)?;
        let progress = progress_bar(books.len(), source);
        let summary = scrape_source(&cache, &mut fetcher, source, &books, &progress);
        progress.finish_and_clear();
        writeln!(
            out,
            "  Results: {} scraped, {} not found, {} errors",
            summary.found, summary.skipped, summary.failed
        )?;
    }

    writeln!(out, "\nScraping complete.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::client::Author;
    use crate::scrape::testing::FakePages;

    const ID_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaa";
    const ID_C: &str = "cccccccccccccccccccccccc";

    fn remote(id: i64, title: &str, authors: &[&str]) -> RemoteBook {
        RemoteBook {
            id,
            title: Some(title.to_string()),
            authors: authors.iter().map(|a| Author { name: a.to_string() }).collect(),
            isbn: Some(format!("{id}{id}{id}")),
            ..Default::default()
        }
    }

    fn search_url(source: Source, title: &str, author: &str) -> String {
        let query = format!("{} {}", title, author);
        format!("{}/search?q={}", source.base_url(), urlencoding::encode(&query))
    }

    #[test]
    fn test_sync_books_to_cache() {
        let cache = Cache::open_in_memory().unwrap();
        cache.upsert_book(1, "Old Title", "Author 1", None).unwrap();

        let books = vec![
            remote(1, "Book A", &["Author 1"]),
            remote(2, "Book B", &["Author 2", "Author 3"]),
            remote(3, "No Author Book", &[]),
        ];
        assert_eq!(sync_books_to_cache(&cache, &books).unwrap(), 3);

        assert_eq!(cache.book_by_booklore_id(1).unwrap().unwrap().title, "Book A");
        assert_eq!(cache.book_by_booklore_id(2).unwrap().unwrap().author, "Author 2");
        let no_author = cache.book_by_booklore_id(3).unwrap().unwrap();
        assert_eq!(no_author.author, "Unknown");
        assert_eq!(no_author.isbn.as_deref(), Some("333"));
    }

    #[test]
    fn test_scrape_source_counts_and_continues() {
        let cache = Cache::open_in_memory().unwrap();
        sync_books_to_cache(
            &cache,
            &[
                remote(1, "Found Book", &["Writer"]),
                remote(2, "Missing Book", &["Writer"]),
                remote(3, "Broken Book", &["Writer"]),
            ],
        )
        .unwrap();

        let source = Source::RomanceIo;
        let mut pages = FakePages::default()
            .with_page(
                &search_url(source, "Found Book", "Writer"),
                &format!(r#"<a href="/books/{ID_A}/found-book-writer">hit</a>"#),
            )
            .with_page(
                &source.book_url(ID_A, "found-book-writer"),
                r#"<a href="/topics/best/enemies-to-lovers,dark/1">t</a>
                   <span>Explicit and plentiful</span>"#,
            )
            .with_page(&search_url(source, "Missing Book", "Writer"), "<p>none</p>")
            // Search hits, but the detail page fails to load.
            .with_page(
                &search_url(source, "Broken Book", "Writer"),
                &format!(r#"<a href="/books/{ID_C}/broken-book-writer">hit</a>"#),
            );

        let books = cache.unscraped_books(source).unwrap();
        let summary = scrape_source(&cache, &mut pages, source, &books, &ProgressBar::hidden());
        assert_eq!(summary, ScrapeSummary { found: 1, skipped: 1, failed: 1 });

        let found = cache.book_by_booklore_id(1).unwrap().unwrap();
        assert_eq!(found.romance_io_id.as_deref(), Some(ID_A));
        let tags: Vec<String> = cache.book_tags(found.id).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(tags, vec!["enemies-to-lovers", "dark"]);
        assert_eq!(cache.intensity(found.id).unwrap().unwrap().level, 5);

        // Unmatched and failed books stay queued for the next run.
        let remaining: Vec<i64> = cache
            .unscraped_books(source)
            .unwrap()
            .iter()
            .map(|b| b.booklore_id)
            .collect();
        assert_eq!(remaining, vec![2, 3]);
        assert_eq!(cache.unscraped_books(Source::Booknaut).unwrap().len(), 3);
    }
}
