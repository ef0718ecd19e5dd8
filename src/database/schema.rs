pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS books (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        booklore_id INTEGER UNIQUE NOT NULL,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        isbn TEXT,
        romance_io_id TEXT,
        booknaut_id TEXT,
        last_scraped_at TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        category TEXT NOT NULL,
        source TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS book_tags (
        book_id INTEGER NOT NULL,
        tag_id INTEGER NOT NULL,
        FOREIGN KEY(book_id) REFERENCES books(id),
        FOREIGN KEY(tag_id) REFERENCES tags(id),
        PRIMARY KEY(book_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS book_steam (
        book_id INTEGER PRIMARY KEY,
        level INTEGER NOT NULL,
        label TEXT,
        FOREIGN KEY(book_id) REFERENCES books(id)
    );

    CREATE TABLE IF NOT EXISTS discoveries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        source TEXT NOT NULL,
        source_id TEXT NOT NULL,
        source_url TEXT,
        genre TEXT,
        steam_level INTEGER,
        discovered_at TEXT DEFAULT CURRENT_TIMESTAMP,
        dismissed INTEGER NOT NULL DEFAULT 0,
        UNIQUE(source, source_id)
    );

    CREATE TABLE IF NOT EXISTS discovery_preferences (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        trope TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        UNIQUE(source, trope)
    );
";
