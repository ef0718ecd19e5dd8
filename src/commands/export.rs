use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::commands::connect;
use crate::library::RemoteBook;
use crate::utils::config::{save_config, Config};

/// Header of a Goodreads library export, which both review sites import.
pub const GOODREADS_FIELDS: [&str; 9] = [
    "Title",
    "Author",
    "Additional Authors",
    "ISBN",
    "ISBN13",
    "Publisher",
    "Year Published",
    "Number of Pages",
    "Bookshelves",
];

pub fn books_to_goodreads_csv(books: &[RemoteBook]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(GOODREADS_FIELDS)?;

    for book in books {
        let additional = book
            .authors
            .iter()
            .skip(1)
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let isbn = book.isbn10.as_deref().or(book.isbn.as_deref()).unwrap_or("");
        let isbn13 = book.isbn13.as_deref().or(book.isbn.as_deref()).unwrap_or("");
        let year: String = book
            .published_date
            .as_deref()
            .map(|d| d.chars().take(4).collect())
            .unwrap_or_default();
        let pages = book.page_count.map(|p| p.to_string()).unwrap_or_default();

        writer.write_record([
            book.title(),
            book.primary_author().unwrap_or(""),
            additional.as_str(),
            isbn,
            isbn13,
            book.publisher.as_deref().unwrap_or(""),
            year.as_str(),
            pages.as_str(),
            "",
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

/// Writes the whole BookLore library as a Goodreads-style CSV. A username
/// given on the command line is saved to the config first.
pub fn run(
    config: &mut Config,
    config_path: &Path,
    username: Option<String>,
    output: &Path,
    out: &mut dyn Write,
) -> Result<usize> {
    if let Some(username) = username {
        config.booklore.username = username;
        save_config(config, config_path)?;
    }

    let client = connect(config)?;
    writeln!(out, "Fetching books...")?;
    let books = client.get_books(true)?;
    writeln!(out, "Found {} books.", books.len())?;

    let csv = books_to_goodreads_csv(&books)?;
    fs::write(output, csv).with_context(|| format!("Failed to write {:?}", output))?;
    info!("Exported {} books to {:?}", books.len(), output);

    writeln!(out, "Exported {} books to {}", books.len(), output.display())?;
    writeln!(out, "\nNext steps:")?;
    writeln!(out, "  1. Go to https://www.romance.io/import")?;
    writeln!(out, "  2. Upload the CSV file")?;
    writeln!(out, "  3. Wait for the confirmation email")?;
    Ok(books.len())
}
