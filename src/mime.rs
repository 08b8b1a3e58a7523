//! Extension to media-type mapping.
//!
//! The table can be loaded from a system `mime.types` mappings file or
//! fall back to a built-in set.  Every entry owns its strings.
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

pub const DEFAULT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Default)]
pub struct MimeTable {
    // Keyed by lowercased extension without the dot.
    types: HashMap<String, String>,
}
impl MimeTable {
    /// A table covering the types a static webroot usually holds.
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for (media_type, extensions) in [
            ("text/html", "html htm"),
            ("text/css", "css"),
            ("text/javascript", "js mjs"),
            ("text/plain", "txt"),
            ("text/markdown", "md"),
            ("text/csv", "csv"),
            ("application/json", "json"),
            ("application/xml", "xml"),
            ("application/pdf", "pdf"),
            ("application/zip", "zip"),
            ("application/gzip", "gz"),
            ("application/wasm", "wasm"),
            ("image/x-icon", "ico"),
            ("image/png", "png"),
            ("image/jpeg", "jpg jpeg"),
            ("image/gif", "gif"),
            ("image/svg+xml", "svg"),
            ("image/webp", "webp"),
            ("font/woff", "woff"),
            ("font/woff2", "woff2"),
            ("font/ttf", "ttf"),
            ("audio/mpeg", "mp3"),
            ("audio/wav", "wav"),
            ("video/mp4", "mp4 mp4v mpg4"),
            ("video/webm", "webm"),
            ("video/mpeg", "mpeg mpg"),
        ] {
            table.add(media_type, extensions);
        }
        table
    }

    /// Reads a `mime.types`-format mappings file: one media type per line
    /// followed by its extensions, `#` starting a comment.  Lines without
    /// extensions are skipped.
    ///
    /// # Errors
    /// Returns an error when it fails to open or read the file.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let file = std::fs::File::open(path)?;
        let mut table = Self::default();
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut tokens = trimmed.split_whitespace();
            let Some(media_type) = tokens.next() else {
                continue;
            };
            for extension in tokens {
                table.add_one(media_type, extension);
            }
        }
        Ok(table)
    }

    fn add(&mut self, media_type: &str, extensions: &str) {
        for extension in extensions.split_whitespace() {
            self.add_one(media_type, extension);
        }
    }

    fn add_one(&mut self, media_type: &str, extension: &str) {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        if !key.is_empty() {
            self.types.insert(key, media_type.to_string());
        }
    }

    /// Looks up a media type by extension, with or without the leading dot,
    /// case-insensitively.
    #[must_use]
    pub fn lookup(&self, extension: &str) -> &str {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        self.types.get(&key).map_or(DEFAULT_TYPE, String::as_str)
    }

    /// Looks up the media type for a file path by its extension.
    #[must_use]
    pub fn for_path(&self, path: &str) -> &str {
        match path.rsplit_once('.') {
            Some((_, extension)) if !extension.contains('/') => self.lookup(extension),
            _ => DEFAULT_TYPE,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
