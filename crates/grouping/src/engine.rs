use common::{GenreBucket, Snapshot, COMBINE_SEPARATOR, UNKNOWN_GENRE};

use crate::GroupingError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Edit {
    AssignTrack {
        track_uri: String,
        source_genre: String,
        target_genre: String,
    },
    AssignByArtist {
        artist: String,
        source_genre: String,
        target_genre: String,
    },
    Combine {
        genres: Vec<String>,
    },
}

impl Edit {
    pub fn label(&self) -> &'static str {
        match self {
            Edit::AssignTrack { .. } => "assign_track",
            Edit::AssignByArtist { .. } => "assign_by_artist",
            Edit::Combine { .. } => "combine",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditReport {
    Assigned,
    ArtistMoved(usize),
    Combined(String),
}

pub fn apply(snapshot: &Snapshot, edit: &Edit) -> Result<(Snapshot, EditReport), GroupingError> {
    match edit {
        Edit::AssignTrack {
            track_uri,
            source_genre,
            target_genre,
        } => {
            let next = assign_track(snapshot, track_uri, source_genre, target_genre)?;
            Ok((next, EditReport::Assigned))
        }
        Edit::AssignByArtist {
            artist,
            source_genre,
            target_genre,
        } => {
            let (next, moved) = assign_by_artist(snapshot, artist, source_genre, target_genre)?;
            Ok((next, EditReport::ArtistMoved(moved)))
        }
        Edit::Combine { genres } => {
            let (next, merged) = combine_genres(snapshot, genres)?;
            Ok((next, EditReport::Combined(merged)))
        }
    }
}

/// Moves one track to the end of `target_genre`, creating that bucket if
/// needed. The source bucket stays in place even when it ends up empty.
pub fn assign_track(
    snapshot: &Snapshot,
    track_uri: &str,
    source_genre: &str,
    target_genre: &str,
) -> Result<Snapshot, GroupingError> {
    let target = resolve_target(snapshot, source_genre, target_genre)?;
    let source = snapshot
        .get(source_genre)
        .ok_or_else(|| GroupingError::NotFound(format!("genre {}", source_genre)))?;
    if !source.contains(track_uri) {
        return Err(GroupingError::NotFound(format!(
            "track {} in genre {}",
            track_uri, source_genre
        )));
    }

    let mut next = snapshot.clone();
    let track = next
        .bucket_mut(source_genre)
        .and_then(|bucket| bucket.remove(track_uri))
        .ok_or_else(|| GroupingError::NotFound(format!("track {}", track_uri)))?;
    next.ensure_bucket(target).push(track);
    Ok(next)
}

/// Moves every track in `source_genre` whose artist is exactly `artist`.
/// No match is a successful no-op reporting zero.
pub fn assign_by_artist(
    snapshot: &Snapshot,
    artist: &str,
    source_genre: &str,
    target_genre: &str,
) -> Result<(Snapshot, usize), GroupingError> {
    let target = resolve_target(snapshot, source_genre, target_genre)?;
    let source = snapshot
        .get(source_genre)
        .ok_or_else(|| GroupingError::NotFound(format!("genre {}", source_genre)))?;
    let matches = source
        .tracks()
        .iter()
        .filter(|track| track.artist == artist)
        .count();
    if matches == 0 {
        return Ok((snapshot.clone(), 0));
    }

    let mut next = snapshot.clone();
    let moved = match next.bucket_mut(source_genre) {
        Some(bucket) => bucket.take_where(|track| track.artist == artist),
        None => Vec::new(),
    };
    let count = moved.len();
    next.ensure_bucket(target).extend(moved);
    Ok((next, count))
}

/// Collapses the named buckets into one. Tracks keep the caller's bucket
/// order; the new name only depends on the set of names.
pub fn combine_genres<S: AsRef<str>>(
    snapshot: &Snapshot,
    genres: &[S],
) -> Result<(Snapshot, String), GroupingError> {
    let mut sources: Vec<&str> = Vec::with_capacity(genres.len());
    for genre in genres {
        let genre = genre.as_ref();
        if !sources.contains(&genre) {
            sources.push(genre);
        }
    }
    if sources.len() < 2 {
        return Err(GroupingError::InvalidArgument(
            "at least two distinct genres are required".to_string(),
        ));
    }
    if sources.iter().any(|genre| *genre == UNKNOWN_GENRE) {
        return Err(GroupingError::InvalidArgument(format!(
            "\"{}\" cannot be combined",
            UNKNOWN_GENRE
        )));
    }
    if let Some(missing) = sources.iter().find(|genre| !snapshot.contains_bucket(genre)) {
        return Err(GroupingError::InvalidArgument(format!(
            "genre {} does not exist",
            missing
        )));
    }

    let merged_name = merged_genre_name(&sources);
    if snapshot.contains_bucket(&merged_name) {
        return Err(GroupingError::Conflict(format!(
            "genre {} already exists",
            merged_name
        )));
    }

    let mut next = snapshot.clone();
    let mut merged = GenreBucket::new(merged_name.clone());
    for genre in &sources {
        if let Some(bucket) = next.remove_bucket(genre) {
            merged.extend(bucket.into_tracks());
        }
    }
    next.insert_bucket(merged);
    Ok((next, merged_name))
}

pub fn merged_genre_name<S: AsRef<str>>(genres: &[S]) -> String {
    let mut names: Vec<&str> = genres.iter().map(|genre| genre.as_ref()).collect();
    names.sort_unstable();
    names.dedup();
    names.join(COMBINE_SEPARATOR)
}

fn resolve_target<'a>(
    snapshot: &Snapshot,
    source_genre: &str,
    target_genre: &'a str,
) -> Result<&'a str, GroupingError> {
    let target = target_genre.trim();
    if target.is_empty() {
        return Err(GroupingError::InvalidArgument(
            "target genre is required".to_string(),
        ));
    }
    if target == source_genre {
        return Err(GroupingError::InvalidArgument(
            "source and target genre are the same".to_string(),
        ));
    }
    // "unknown" may be filled but never created
    if target == UNKNOWN_GENRE && !snapshot.contains_bucket(UNKNOWN_GENRE) {
        return Err(GroupingError::InvalidArgument(format!(
            "\"{}\" is reserved",
            UNKNOWN_GENRE
        )));
    }
    Ok(target)
}
