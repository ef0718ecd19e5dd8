use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};

/// A review site we scrape trope and spice metadata from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    RomanceIo,
    Booknaut,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::RomanceIo, Source::Booknaut];

    pub fn key(&self) -> &'static str {
        match self {
            Source::RomanceIo => "romance.io",
            Source::Booknaut => "booknaut",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Source::RomanceIo => "https://www.romance.io",
            Source::Booknaut => "https://www.thebooknaut.com",
        }
    }

    /// Cache column holding this site's external id for a book.
    pub(crate) fn id_column(&self) -> &'static str {
        match self {
            Source::RomanceIo => "romance_io_id",
            Source::Booknaut => "booknaut_id",
        }
    }

    pub fn book_url(&self, external_id: &str, slug: &str) -> String {
        format!("{}/books/{}/{}", self.base_url(), external_id, slug)
    }

    pub fn topic_url(&self, trope: &str) -> String {
        format!("{}/topics/best/{}/1", self.base_url(), trope)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "romance.io" => Ok(Source::RomanceIo),
            "booknaut" => Ok(Source::Booknaut),
            other => Err(anyhow!("unknown source '{}'", other)),
        }
    }
}

/// Source selection as given on the command line (`all` or one site).
pub fn parse_selection(s: &str) -> Result<Vec<Source>, Error> {
    if s == "all" {
        Ok(Source::ALL.to_vec())
    } else {
        Ok(vec![s.parse()?])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Genre {
    Romance,
    SciFi,
    Fantasy,
}

impl Genre {
    pub const ALL: [Genre; 3] = [Genre::Romance, Genre::SciFi, Genre::Fantasy];

    pub fn name(&self) -> &'static str {
        match self {
            Genre::Romance => "romance",
            Genre::SciFi => "sci-fi",
            Genre::Fantasy => "fantasy",
        }
    }

    /// The site whose topic pages cover this genre.
    pub fn source(&self) -> Source {
        match self {
            Genre::Romance => Source::RomanceIo,
            Genre::SciFi | Genre::Fantasy => Source::Booknaut,
        }
    }
}

impl FromStr for Genre {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "romance" => Ok(Genre::Romance),
            "sci-fi" => Ok(Genre::SciFi),
            "fantasy" => Ok(Genre::Fantasy),
            other => Err(anyhow!("unknown genre '{}'", other)),
        }
    }
}
