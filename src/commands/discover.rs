use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::commands::{humanize_slug, truncate};
use crate::database::repo::{Cache, NewDiscovery};
use crate::scrape::extract::extract_links;
use crate::scrape::fetcher::{BrowserFetcher, PageSource};
use crate::source::{Genre, Source};
use crate::utils::config::Config;

const MAX_LISTED: usize = 25;

/// A book seen on a topic page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source: Source,
    pub source_id: String,
    pub slug: String,
    pub source_url: String,
}

impl Candidate {
    pub fn title(&self) -> String {
        humanize_slug(&self.slug)
    }
}

pub fn build_topic_urls(source: Source, tropes: &[String]) -> Vec<String> {
    tropes.iter().map(|trope| source.topic_url(trope)).collect()
}

/// Drops candidates whose external id the cache already holds for `source`.
pub fn filter_known_books(cache: &Cache, candidates: Vec<Candidate>, source: Source) -> Result<Vec<Candidate>> {
    let known = cache.known_external_ids(source)?;
    Ok(candidates
        .into_iter()
        .filter(|c| !known.contains(&c.source_id))
        .collect())
}

/// Genres to browse: those hosted by one of `sources`, narrowed to `genre`
/// when given.
pub fn select_genres(sources: &[Source], genre: Option<Genre>) -> Vec<Genre> {
    Genre::ALL
        .into_iter()
        .filter(|g| sources.contains(&g.source()))
        .filter(|g| genre.map_or(true, |wanted| wanted == *g))
        .collect()
}

/// Walks each topic page and collects books not yet in the library. `seen`
/// spans the whole run, so a book listed under several genres is kept once.
/// A page that fails to load is logged and skipped.
pub fn discover_from_source(
    cache: &Cache,
    pages: &mut dyn PageSource,
    source: Source,
    tropes: &[String],
    seen: &mut HashSet<(Source, String)>,
    out: &mut dyn Write,
) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for url in build_topic_urls(source, tropes) {
        writeln!(out, "  Checking {}...", url)?;
        let html = match pages.fetch_page(&url, None) {
            Ok(html) => html,
            Err(e) => {
                warn!("Skipping topic page {}: {}", url, e);
                continue;
            }
        };

        for link in extract_links(&html) {
            if seen.insert((source, link.external_id.clone())) {
                candidates.push(Candidate {
                    source,
                    source_url: source.book_url(&link.external_id, &link.slug),
                    source_id: link.external_id,
                    slug: link.slug,
                });
            }
        }
    }

    filter_known_books(cache, candidates, source)
}

/// Stores candidates as discoveries. Returns how many were new.
pub fn store_discoveries(cache: &Cache, candidates: &[Candidate], genre: Genre) -> Result<usize> {
    let mut added = 0;
    for candidate in candidates {
        let discovery = NewDiscovery {
            title: candidate.title(),
            source: candidate.source,
            source_id: candidate.source_id.clone(),
            source_url: Some(candidate.source_url.clone()),
            genre: Some(genre.name().to_string()),
            steam_level: None,
        };
        if cache.add_discovery(&discovery)? {
            added += 1;
        }
    }
    Ok(added)
}

fn print_candidates(candidates: &[Candidate], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "\nDiscovered {} New Books", candidates.len())?;
    writeln!(out, "{:<12}  {:<50}  URL", "Source", "Title/Slug")?;
    for candidate in candidates.iter().take(MAX_LISTED) {
        writeln!(
            out,
            "{:<12}  {:<50}  {}",
            candidate.source.key(),
            truncate(&candidate.title(), 50),
            candidate.source_url
        )?;
    }
    if candidates.len() > MAX_LISTED {
        writeln!(out, "  ... and {} more.", candidates.len() - MAX_LISTED)?;
    }
    Ok(())
}

pub fn run(
    config: &Config,
    db_path: &Path,
    sources: &[Source],
    genre: Option<Genre>,
    out: &mut dyn Write,
) -> Result<()> {
    let targets: Vec<(Genre, &[String])> = select_genres(sources, genre)
        .into_iter()
        .map(|g| (g, config.discovery.tropes_for(g)))
        .filter(|(_, tropes)| !tropes.is_empty())
        .collect();
    if targets.is_empty() {
        writeln!(out, "No trope preferences configured for that source/genre.")?;
        return Ok(());
    }

    let cache = Cache::open(db_path)?;
    let mut fetcher = BrowserFetcher::launch(&config.scraping)?;

    let mut seen = HashSet::new();
    let mut all_new = Vec::new();
    for (genre, tropes) in targets {
        let source = genre.source();
        writeln!(out, "\nDiscovering {} from {}...", genre.name(), source)?;
        let found = discover_from_source(&cache, &mut fetcher, source, tropes, &mut seen, out)?;
        let added = store_discoveries(&cache, &found, genre)?;
        info!("{}: {} candidates, {} newly stored", genre.name(), found.len(), added);
        all_new.extend(found);
    }

    if all_new.is_empty() {
        writeln!(out, "No new books found for your trope preferences.")?;
    } else {
        print_candidates(&all_new, out)?;
    }
    Ok(())
}

/// Lists stored discoveries, or soft-deletes one when `dismiss` is given.
pub fn run_list(
    db_path: &Path,
    source: Option<Source>,
    include_dismissed: bool,
    dismiss: Option<i64>,
    out: &mut dyn Write,
) -> Result<()> {
    let cache = Cache::open(db_path)?;

    if let Some(id) = dismiss {
        if cache.dismiss_discovery(id)? {
            writeln!(out, "Dismissed discovery {}.", id)?;
        } else {
            writeln!(out, "No discovery with id {}.", id)?;
        }
        return Ok(());
    }

    let discoveries = cache.list_discoveries(source, include_dismissed)?;
    if discoveries.is_empty() {
        writeln!(out, "No discoveries stored. Run 'discover' first.")?;
        return Ok(());
    }

    writeln!(out, "{:>5}  {:<12}  {:<8}  {:<50}  URL", "ID", "Source", "Genre", "Title")?;
    for d in &discoveries {
        let mut title = truncate(&d.title, 50);
        if d.dismissed {
            title.push_str(" (dismissed)");
        }
        writeln!(
            out,
            "{:>5}  {:<12}  {:<8}  {:<50}  {}",
            d.id,
            d.source,
            d.genre.as_deref().unwrap_or("-"),
            title,
            d.source_url.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}
