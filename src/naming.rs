//! Filename helpers for the `name-WxH.ext` output convention.
//!
//! Resized outputs carry their size as a suffix right before the extension:
//! - `empire.png` + `300x300` → `empire-300x300.png`
//! - `empire-1501x2001.png` → `empire.png` (suffix removed)
//! - `banner` + `640x480` → `banner-640x480` (no extension: appended)
//!
//! Everything here is hand-parsed; no regex engine is involved.

/// File extensions accepted by [`check_filename_schema`].
pub const SCHEMA_EXTENSIONS: &[&str] = &["avif", "gif", "jpeg", "jpg", "png", "svg", "tiff", "webp"];

fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) => filename.split_at(pos),
        None => (filename, ""),
    }
}

/// Insert `-WxH` before the last extension (or at the end when there is none).
pub fn add_size_suffix(filename: &str, size: (u32, u32)) -> String {
    let (stem, ext) = split_extension(filename);
    format!("{stem}-{}x{}{ext}", size.0, size.1)
}

/// Length of a trailing `-<digits>x<digits>` on `stem`, if present.
fn size_suffix_len(stem: &str) -> Option<usize> {
    let bytes = stem.as_bytes();
    let height_digits = bytes.iter().rev().take_while(|b| b.is_ascii_digit()).count();
    if height_digits == 0 {
        return None;
    }
    let rest = &bytes[..bytes.len() - height_digits];
    let rest = rest.strip_suffix(b"x")?;
    let width_digits = rest.iter().rev().take_while(|b| b.is_ascii_digit()).count();
    if width_digits == 0 {
        return None;
    }
    let rest = &rest[..rest.len() - width_digits];
    rest.strip_suffix(b"-")?;
    Some(height_digits + 1 + width_digits + 1)
}

/// Remove a `-WxH` suffix sitting directly before the last extension.
///
/// Names without such a suffix are returned unchanged, so
/// `remove_size_suffix(&add_size_suffix(f, s)) == f` for any suffix-free `f`.
pub fn remove_size_suffix(filename: &str) -> String {
    let (stem, ext) = split_extension(filename);
    match size_suffix_len(stem) {
        Some(len) => format!("{}{ext}", &stem[..stem.len() - len]),
        None => filename.to_string(),
    }
}

/// Whether `filename` contains `-WxH` followed by an extension.
pub fn has_size_suffix(filename: &str, size: (u32, u32)) -> bool {
    filename.contains(&format!("-{}x{}.", size.0, size.1))
}

/// Whether `filename` follows `<name>-<W>x<H>.<image extension>`.
///
/// `<name>` may contain ASCII letters, digits, `_`, `,`, `-` and whitespace.
pub fn check_filename_schema(filename: &str) -> bool {
    let Some((stem, ext)) = filename.rsplit_once('.') else {
        return false;
    };
    if !SCHEMA_EXTENSIONS.contains(&ext) {
        return false;
    }
    let Some(len) = size_suffix_len(stem) else {
        return false;
    };
    let name = &stem[..stem.len() - len];
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ',' || c == '-' || c.is_whitespace())
}

/// Lowercased text after the last dot, if the name has one.
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Parse `"800x600"` into `(800, 600)`.
pub fn parse_size(text: &str) -> Option<(u32, u32)> {
    let (w, h) = text.trim().split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn strip_html_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('>') {
            Some(close) if close > 0 => rest = &after[close + 1..],
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn transliterate_umlauts(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'Ä' => out.push_str("Ae"),
            'Ö' => out.push_str("Oe"),
            'Ü' => out.push_str("Ue"),
            'ß' => out.push_str("ss"),
            other => out.push(other),
        }
    }
    out
}

/// Collapse runs of chars matching `is_sep` into a single `-`.
fn collapse_runs(text: &str, is_sep: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if is_sep(c) {
            if !in_run {
                out.push('-');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

/// Turn free text (a title, a caption) into a slug usable as a filename.
///
/// HTML tags are dropped, German umlauts transliterated, `&` becomes `und`,
/// and separators collapse to single dashes:
/// `"<b>Bücher</b> & Schränke_2024"` → `"buecher-und-schraenke-2024"`.
pub fn unique_text(text: &str) -> String {
    let text = transliterate_umlauts(&strip_html_tags(text));
    let text = collapse_runs(&text, |c| c.is_whitespace() || c == '-' || c == '_').to_lowercase();
    let text: String = text
        .replace('&', "und")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
        .collect();
    collapse_runs(&text, |c| c == '-' || c == '_')
}
