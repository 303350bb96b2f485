//! # Prefer Header
//!
//! `Prefer: return=representation` asks mutations to return the affected
//! rows. Anything else, including unknown preferences, leaves the default.

/// What a mutation returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnPreference {
    /// Empty list on success
    #[default]
    Minimal,
    /// Affected rows, projected like a read
    Representation,
}

/// Parsed `Prefer` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preferences {
    pub returning: ReturnPreference,
}

impl Preferences {
    pub fn parse(header: Option<&str>) -> Self {
        let mut prefs = Preferences::default();
        let Some(header) = header else {
            return prefs;
        };

        for token in header.split(',') {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("return") {
                match value.trim().to_ascii_lowercase().as_str() {
                    "representation" => prefs.returning = ReturnPreference::Representation,
                    "minimal" => prefs.returning = ReturnPreference::Minimal,
                    _ => {}
                }
            }
        }
        prefs
    }
}
