pub mod discover;
pub mod export;
pub mod scrape;
pub mod tag;

use anyhow::{Context, Result};
use tracing::info;

use crate::library::LibraryClient;
use crate::utils::config::{get_password, Config};

/// Logs into BookLore. The username is checked before the password prompt
/// so a missing config aborts before any network call.
pub fn connect(config: &Config) -> Result<LibraryClient> {
    let username = config.require_username()?;
    let password = get_password()?;

    let mut client = LibraryClient::new(&config.booklore.url)?;
    info!("Connecting to BookLore at {}", config.booklore.url);
    client
        .login(username, &password)
        .context("BookLore login failed")?;
    Ok(client)
}

/// `enemies-to-lovers` -> `Enemies To Lovers`.
///
/// Casing follows word boundaries the way title-casing usually does: a
/// letter is upper-cased when the previous character is not a letter.
pub fn humanize_slug(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    let mut prev_letter = false;
    for c in slug.chars() {
        let c = if c == '-' { ' ' } else { c };
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize_slug() {
        assert_eq!(humanize_slug("enemies-to-lovers"), "Enemies To Lovers");
        assert_eq!(humanize_slug("dark"), "Dark");
        assert_eq!(humanize_slug("MMF-romance"), "Mmf Romance");
        assert_eq!(humanize_slug("second-chance-2nd"), "Second Chance 2Nd");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer title", 8), "a longer");
    }
}
