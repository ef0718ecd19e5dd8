use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::commands::{connect, humanize_slug};
use crate::database::repo::Cache;
use crate::library::LibraryApi;
use crate::utils::config::Config;

const TROPE_CATEGORY: &str = "trope";

/// Shelf name for each spice level, indexed by `level - 1`.
pub const INTENSITY_SHELF_NAMES: [&str; 5] = [
    "Spice: 1 - Glimpses & Kisses",
    "Spice: 2 - Behind Closed Doors",
    "Spice: 3 - Open Door",
    "Spice: 4 - Explicit Open Door",
    "Spice: 5 - Explicit & Plentiful",
];

pub fn intensity_shelf_name(level: u8) -> Option<&'static str> {
    INTENSITY_SHELF_NAMES
        .get(usize::from(level).checked_sub(1)?)
        .copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfKind {
    Trope,
    Intensity,
}

impl fmt::Display for ShelfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShelfKind::Trope => f.write_str("trope"),
            ShelfKind::Intensity => f.write_str("spice"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedShelf {
    pub name: String,
    pub kind: ShelfKind,
    /// Remote ids, ascending.
    pub booklore_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TagOptions {
    pub dry_run: bool,
    pub skip_shelves: bool,
    pub skip_tags: bool,
}

/// Groups enriched books onto one shelf per trope and one per spice level.
pub fn build_shelf_plan(cache: &Cache) -> Result<Vec<PlannedShelf>> {
    let mut tropes: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
    let mut levels: BTreeMap<&'static str, BTreeSet<i64>> = BTreeMap::new();

    for enriched in cache.enriched_books()? {
        let booklore_id = enriched.book.booklore_id;
        for tag in enriched.tags.iter().filter(|t| t.category == TROPE_CATEGORY) {
            tropes
                .entry(humanize_slug(&tag.name))
                .or_default()
                .insert(booklore_id);
        }
        if let Some(name) = enriched
            .intensity
            .as_ref()
            .and_then(|i| intensity_shelf_name(i.level))
        {
            levels.entry(name).or_default().insert(booklore_id);
        }
    }

    let trope_shelves = tropes.into_iter().map(|(name, ids)| PlannedShelf {
        name,
        kind: ShelfKind::Trope,
        booklore_ids: ids.into_iter().collect(),
    });
    let intensity_shelves = levels.into_iter().map(|(name, ids)| PlannedShelf {
        name: name.to_string(),
        kind: ShelfKind::Intensity,
        booklore_ids: ids.into_iter().collect(),
    });
    Ok(trope_shelves.chain(intensity_shelves).collect())
}

/// Category tags to add per remote book id: every cached tag name in link
/// order plus `spice-N` when a level is known.
pub fn build_tag_plan(cache: &Cache) -> Result<BTreeMap<i64, Vec<String>>> {
    let mut plan = BTreeMap::new();
    for enriched in cache.enriched_books()? {
        let mut tags: Vec<String> = Vec::new();
        for tag in enriched.tags {
            if !tags.contains(&tag.name) {
                tags.push(tag.name);
            }
        }
        if let Some(intensity) = enriched.intensity {
            let spice = format!("spice-{}", intensity.level);
            if !tags.contains(&spice) {
                tags.push(spice);
            }
        }
        if !tags.is_empty() {
            plan.insert(enriched.book.booklore_id, tags);
        }
    }
    Ok(plan)
}

/// Planned tags the book does not already carry, compared case-insensitively.
pub fn diff_tags(planned: &[String], existing: &[String]) -> Vec<String> {
    let existing: HashSet<String> = existing.iter().map(|t| t.to_lowercase()).collect();
    planned
        .iter()
        .filter(|t| !existing.contains(&t.to_lowercase()))
        .cloned()
        .collect()
}

/// Creates missing shelves and assigns each its full book set. Books are
/// never removed from a shelf.
pub fn apply_shelves(
    api: &dyn LibraryApi,
    plan: &[PlannedShelf],
    out: &mut dyn Write,
) -> Result<()> {
    let existing: HashMap<String, i64> = api
        .get_shelves()
        .context("Failed to list shelves")?
        .into_iter()
        .map(|s| (s.name, s.id))
        .collect();

    for shelf in plan {
        let shelf_id = match existing.get(&shelf.name) {
            Some(&id) => {
                writeln!(out, "  Shelf '{}' already exists.", shelf.name)?;
                id
            }
            None => {
                let created = api
                    .create_shelf(&shelf.name)
                    .with_context(|| format!("Failed to create shelf '{}'", shelf.name))?;
                writeln!(out, "  Created shelf '{}'.", shelf.name)?;
                created.id
            }
        };

        api.assign_books_to_shelf(shelf_id, &shelf.booklore_ids)
            .with_context(|| format!("Failed to assign books to shelf '{}'", shelf.name))?;
        writeln!(out, "    Assigned {} books.", shelf.booklore_ids.len())?;
    }
    Ok(())
}

/// Adds the missing category tags to each book, merging with what is
/// already there. Returns how many books were written.
pub fn apply_tags(
    api: &dyn LibraryApi,
    plan: &BTreeMap<i64, Vec<String>>,
    out: &mut dyn Write,
) -> Result<usize> {
    writeln!(out, "\nAdding category tags to books...")?;
    let mut updated = 0;

    for (&booklore_id, planned) in plan {
        let existing = match api.get_book(booklore_id, false) {
            Ok(book) => book.categories(),
            Err(e) => {
                warn!("Could not read categories of book {}: {}", booklore_id, e);
                Vec::new()
            }
        };

        let missing = diff_tags(planned, &existing);
        if missing.is_empty() {
            continue;
        }
        api.update_book_metadata(booklore_id, &missing, true)
            .with_context(|| format!("Failed to update categories of book {}", booklore_id))?;
        info!("Book {}: added {:?}", booklore_id, missing);
        updated += 1;
    }

    writeln!(
        out,
        "  Tagged {} books ({} already up to date).",
        updated,
        plan.len() - updated
    )?;
    Ok(updated)
}

fn print_plan(
    shelves: &[PlannedShelf],
    tags: &BTreeMap<i64, Vec<String>>,
    out: &mut dyn Write,
) -> Result<()> {
    let width = shelves
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Shelf Name".len());

    writeln!(out, "Shelf Plan")?;
    writeln!(out, "{:<width$}  {:<6}  Books", "Shelf Name", "Type")?;
    for shelf in shelves {
        writeln!(
            out,
            "{:<width$}  {:<6}  {}",
            shelf.name,
            shelf.kind.to_string(),
            shelf.booklore_ids.len()
        )?;
    }
    writeln!(out, "\nTag plan: {} books will get category tags.", tags.len())?;
    Ok(())
}

pub fn run(config: &Config, db_path: &Path, options: TagOptions, out: &mut dyn Write) -> Result<()> {
    let cache = Cache::open(db_path)?;
    let shelves = build_shelf_plan(&cache)?;
    let tags = build_tag_plan(&cache)?;

    if shelves.is_empty() && tags.is_empty() {
        writeln!(out, "No enrichment data found. Run 'scrape' first.")?;
        return Ok(());
    }

    print_plan(&shelves, &tags, out)?;
    if options.dry_run {
        writeln!(out, "\nDRY RUN - no changes made.")?;
        return Ok(());
    }

    let client = connect(config)?;
    if options.skip_shelves {
        info!("Skipping shelf creation");
    } else {
        apply_shelves(&client, &shelves, out)?;
    }
    if options.skip_tags {
        info!("Skipping category tags");
    } else {
        apply_tags(&client, &tags, out)?;
    }

    writeln!(out, "\nTagging complete.")?;
    Ok(())
}
