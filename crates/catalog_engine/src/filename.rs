//! Name normalisation for folders, artifact files, slugs and SKUs.

use sha2::{Digest, Sha256};

const MAX_STEM_LEN: usize = 80;
const SKU_BASE_LEN: usize = 15;

/// Replaces accented Latin letters with their ASCII base and drops every
/// other non-ASCII character.
pub fn fold_ascii(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => out.push('a'),
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => out.push('A'),
            'ç' | 'ć' | 'č' => out.push('c'),
            'Ç' | 'Ć' | 'Č' => out.push('C'),
            'ď' | 'đ' => out.push('d'),
            'Ď' | 'Đ' => out.push('D'),
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => out.push('e'),
            'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => out.push('E'),
            'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => out.push('i'),
            'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' => out.push('I'),
            'ł' | 'ľ' => out.push('l'),
            'Ł' | 'Ľ' => out.push('L'),
            'ñ' | 'ń' | 'ň' => out.push('n'),
            'Ñ' | 'Ń' | 'Ň' => out.push('N'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => out.push('o'),
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => out.push('O'),
            'ŕ' | 'ř' => out.push('r'),
            'Ŕ' | 'Ř' => out.push('R'),
            'ś' | 'š' | 'ş' => out.push('s'),
            'Ś' | 'Š' | 'Ş' => out.push('S'),
            'ť' | 'ţ' => out.push('t'),
            'Ť' | 'Ţ' => out.push('T'),
            'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => out.push('u'),
            'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' | 'Ų' => out.push('U'),
            'ý' | 'ÿ' => out.push('y'),
            'Ý' | 'Ÿ' => out.push('Y'),
            'ź' | 'ż' | 'ž' => out.push('z'),
            'Ź' | 'Ż' | 'Ž' => out.push('Z'),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'ß' => out.push_str("ss"),
            '\u{2019}' | '\u{2018}' => out.push('\''),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{00a0}' => out.push(' '),
            _ => {}
        }
    }
    out
}

/// Lower-case, accent-free display name with dashes read as spaces.
pub fn clean_name(name: &str) -> String {
    fold_ascii(name)
        .to_lowercase()
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-product folder label written in the table's folder column.
pub fn folder_name(name: &str) -> String {
    clean_name(name).replace(' ', "-")
}

/// `<slug>.txt` artifact filename for a competitor document title.
pub fn artifact_filename(title: &str) -> String {
    let mut stem = slugify(title);
    if stem.is_empty() {
        stem = format!("untitled-{}", short_hash(title));
    }
    if stem.len() > MAX_STEM_LEN {
        stem.truncate(MAX_STEM_LEN);
        stem = stem.trim_end_matches('-').to_string();
    }
    if is_reserved_windows_name(&stem) {
        stem.push('_');
    }
    format!("{stem}.txt")
}

/// ASCII slug: lower-case alphanumerics joined by single dashes.
pub fn slugify(text: &str) -> String {
    let folded = fold_ascii(text).to_lowercase();
    let mut slug = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c == '-' || c.is_whitespace() {
            pending_dash = true;
        }
    }
    slug
}

/// Parent SKU: the product name reduced to word characters and dashes, first
/// fifteen characters, upper-case.
pub fn base_sku(name: &str) -> String {
    let mut reduced = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.to_lowercase().chars() {
        if is_word(c) {
            if pending_dash && !reduced.is_empty() {
                reduced.push('-');
            }
            pending_dash = false;
            reduced.push(c);
        } else {
            pending_dash = true;
        }
    }
    reduced
        .chars()
        .take(SKU_BASE_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// Variation SKU: `<base>-<LABEL>` with non-word characters removed.
pub fn variation_sku(base: &str, label: &str) -> String {
    let label: String = label.chars().filter(|c| is_word(*c)).collect();
    format!("{base}-{}", label.to_uppercase())
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accents_fold_to_ascii() {
        assert_eq!(fold_ascii("Crème Brûlée"), "Creme Brulee");
        assert_eq!(fold_ascii("Œuf – 北京"), "OEuf - ");
    }

    #[test]
    fn folder_names_collapse_whitespace() {
        assert_eq!(clean_name("  Tasse-Émaillée  Bleue "), "tasse emaillee bleue");
        assert_eq!(folder_name("Tasse-Émaillée  Bleue"), "tasse-emaillee-bleue");
    }

    #[test]
    fn slugs_and_artifacts() {
        assert_eq!(slugify("Blue Mug -- 2024 (Large)!"), "blue-mug-2024-large");
        assert_eq!(artifact_filename("Théière en fonte"), "theiere-en-fonte.txt");
        assert!(artifact_filename("???").starts_with("untitled-"));
        assert_eq!(artifact_filename("con"), "con_.txt");
    }

    #[test]
    fn skus_follow_product_name() {
        let base = base_sku("Grand Bol à Soupe, Édition Limitée");
        assert_eq!(base, "GRAND-BOL-À-SOU");
        assert_eq!(variation_sku(&base, "Vert d'eau"), "GRAND-BOL-À-SOU-VERTDEAU");
    }
}
