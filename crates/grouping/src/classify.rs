use std::collections::{HashMap, HashSet};

use common::{CatalogTrack, Snapshot, UNKNOWN_GENRE};
use tracing::{debug, warn};

use crate::GroupingError;

/// Produces the first grouping of a playlist.
pub trait Classifier: Send + Sync {
    fn classify(&self, tracks: &[CatalogTrack]) -> Result<Snapshot, GroupingError>;
}

/// Labels each track by its first usable genre tag.
#[derive(Clone, Debug, Default)]
pub struct TagClassifier {
    aliases: HashMap<String, String>,
}

impl TagClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `aliases` maps a tag (matched after folding case and accents) to the
    /// bucket name it should land in.
    pub fn with_aliases<'a, I>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let aliases = aliases
            .into_iter()
            .filter_map(|(tag, label)| {
                let key = fold_genre(tag);
                let label = collapse_whitespace(&label.trim().to_lowercase());
                if key.is_empty() || label.is_empty() {
                    None
                } else {
                    Some((key, label))
                }
            })
            .collect();
        Self { aliases }
    }

    pub fn label_for(&self, tags: &[String]) -> Option<String> {
        tags.iter().find_map(|tag| self.normalize_label(tag))
    }

    fn normalize_label(&self, tag: &str) -> Option<String> {
        let lower = collapse_whitespace(&tag.trim().to_lowercase());
        if lower.is_empty() {
            return None;
        }
        let folded = fold_genre(&lower);
        if let Some(label) = self.aliases.get(&folded) {
            return Some(label.clone());
        }
        if let Some(label) = localized_label(&folded) {
            return Some(label.to_string());
        }
        Some(lower)
    }
}

impl Classifier for TagClassifier {
    fn classify(&self, tracks: &[CatalogTrack]) -> Result<Snapshot, GroupingError> {
        let mut snapshot = Snapshot::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut unclassified = 0usize;
        for track in tracks {
            if track.uri.trim().is_empty() {
                warn!("Skipping track without uri: {}", track.name);
                continue;
            }
            if !seen.insert(track.uri.as_str()) {
                debug!("Dropping duplicate track {}", track.uri);
                continue;
            }
            let label = match self.label_for(&track.genres) {
                Some(label) => label,
                None => {
                    unclassified += 1;
                    UNKNOWN_GENRE.to_string()
                }
            };
            snapshot.ensure_bucket(&label).push(track.to_track());
        }
        snapshot.validate()?;
        debug!(
            "Classified {} tracks into {} genres ({} unclassified)",
            snapshot.track_count(),
            snapshot.bucket_count(),
            unclassified
        );
        Ok(snapshot)
    }
}

fn localized_label(folded: &str) -> Option<&'static str> {
    match folded {
        "musique classique" | "classique" | "musica clasica" | "musica classica" | "klassik"
        | "klassische musik" => Some("classical"),
        "musique de chambre" | "musica de camara" | "kammermusik" => Some("chamber music"),
        "musique de film" | "musiques de film" | "musica de pelicula" | "banda sonora"
        | "colonna sonora" | "filmmusik" => Some("soundtrack"),
        "musique electronique" | "musica elettronica" | "musica electronica"
        | "elektronische musik" => Some("electronic"),
        "musique instrumentale" | "musica strumentale" | "musica instrumental"
        | "instrumentalmusik" => Some("instrumental"),
        "musique ambient" | "musique ambiante" | "musica ambient" => Some("ambient"),
        "piano solo" => Some("solo piano"),
        "musica contemporanea" | "musica clasica contemporanea"
        | "zeitgenossische klassische musik" => Some("contemporary classical"),
        _ => None,
    }
}

/// Lower-cases, strips accents and collapses every run of punctuation or
/// whitespace into one space.
fn fold_genre(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_space = true;
    for ch in value.to_lowercase().chars() {
        let mapped = match ch {
            'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' => 'a',
            'ç' => 'c',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ñ' => 'n',
            'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ý' | 'ÿ' => 'y',
            'œ' => {
                out.push('o');
                'e'
            }
            'æ' => {
                out.push('a');
                'e'
            }
            _ => ch,
        };
        if mapped.is_alphanumeric() {
            out.push(mapped);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_track(uri: &str, genres: &[&str]) -> CatalogTrack {
        CatalogTrack {
            uri: uri.to_string(),
            name: format!("Song {}", uri),
            artist: "Artist".to_string(),
            image_url: None,
            genres: genres.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[test]
    fn groups_by_first_usable_tag() {
        let tracks = vec![
            catalog_track("a", &["Rock", "pop"]),
            catalog_track("b", &["  ", "Pop"]),
            catalog_track("c", &["rock"]),
        ];
        let snapshot = TagClassifier::new().classify(&tracks).unwrap();
        let names: Vec<&str> = snapshot.bucket_names().collect();
        assert_eq!(names, vec!["pop", "rock"]);
        assert_eq!(snapshot.get("rock").unwrap().len(), 2);
        assert!(!snapshot.contains_bucket(UNKNOWN_GENRE));
    }

    #[test]
    fn untagged_tracks_go_to_unknown() {
        let tracks = vec![catalog_track("a", &[]), catalog_track("b", &["jazz"])];
        let snapshot = TagClassifier::new().classify(&tracks).unwrap();
        assert_eq!(snapshot.get(UNKNOWN_GENRE).unwrap().tracks()[0].uri, "a");
    }

    #[test]
    fn duplicate_uris_keep_first_occurrence() {
        let tracks = vec![
            catalog_track("a", &["jazz"]),
            catalog_track("a", &["rock"]),
            catalog_track("b", &["rock"]),
        ];
        let snapshot = TagClassifier::new().classify(&tracks).unwrap();
        assert_eq!(snapshot.track_count(), 2);
        assert_eq!(snapshot.locate("a"), Some("jazz"));
    }

    #[test]
    fn maps_localized_names_and_aliases() {
        let mut aliases = HashMap::new();
        aliases.insert("Rap".to_string(), "Hip  Hop".to_string());
        let classifier = TagClassifier::with_aliases(&aliases);
        assert_eq!(
            classifier.label_for(&["Musique Électronique".to_string()]),
            Some("electronic".to_string())
        );
        assert_eq!(
            classifier.label_for(&["RAP".to_string()]),
            Some("hip hop".to_string())
        );
        assert_eq!(
            classifier.label_for(&["R&B".to_string()]),
            Some("r&b".to_string())
        );
    }
}
