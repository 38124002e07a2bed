use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Bucket holding tracks the classifier could not label.
pub const UNKNOWN_GENRE: &str = "unknown";

/// Joins source names when buckets are combined.
pub const COMBINE_SEPARATOR: &str = " + ";

const FIELD_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,
    pub name: String,
    pub artist: String,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
}

/// A track as the catalog reports it, before classification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub uri: String,
    pub name: String,
    pub artist: String,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl CatalogTrack {
    pub fn to_track(&self) -> Track {
        Track {
            uri: self.uri.clone(),
            name: self.name.clone(),
            artist: self.artist.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenreBucket {
    name: String,
    tracks: Vec<Track>,
}

impl GenreBucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
        }
    }

    pub fn with_tracks(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            name: name.into(),
            tracks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.tracks.iter().any(|track| track.uri == uri)
    }

    pub fn push(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) {
        self.tracks.extend(tracks);
    }

    /// Removes the track with `uri`, keeping the order of the others.
    pub fn remove(&mut self, uri: &str) -> Option<Track> {
        let index = self.tracks.iter().position(|track| track.uri == uri)?;
        Some(self.tracks.remove(index))
    }

    /// Splits off every track matching `pred`, both halves keeping their order.
    pub fn take_where<F>(&mut self, mut pred: F) -> Vec<Track>
    where
        F: FnMut(&Track) -> bool,
    {
        let (taken, kept): (Vec<Track>, Vec<Track>) =
            self.tracks.drain(..).partition(|track| pred(track));
        self.tracks = kept;
        taken
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }
}

/// Complete grouping of one playlist. Buckets iterate in name order.
///
/// The mutators below are low level: they keep bucket keys consistent but do
/// not check track uniqueness. Callers that build snapshots by hand should
/// finish with [`Snapshot::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<Track>>")]
pub struct Snapshot {
    buckets: BTreeMap<String, GenreBucket>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_buckets(
        buckets: impl IntoIterator<Item = GenreBucket>,
    ) -> Result<Self, SnapshotError> {
        let mut snapshot = Snapshot::new();
        for bucket in buckets {
            if snapshot.buckets.contains_key(bucket.name()) {
                return Err(SnapshotError::DuplicateBucket(bucket.name));
            }
            snapshot.buckets.insert(bucket.name.clone(), bucket);
        }
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn get(&self, name: &str) -> Option<&GenreBucket> {
        self.buckets.get(name)
    }

    pub fn contains_bucket(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(|name| name.as_str())
    }

    pub fn buckets(&self) -> impl Iterator<Item = &GenreBucket> {
        self.buckets.values()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn track_count(&self) -> usize {
        self.buckets.values().map(GenreBucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Name of the bucket holding `uri`.
    pub fn locate(&self, uri: &str) -> Option<&str> {
        self.buckets
            .values()
            .find(|bucket| bucket.contains(uri))
            .map(|bucket| bucket.name())
    }

    pub fn bucket_mut(&mut self, name: &str) -> Option<&mut GenreBucket> {
        self.buckets.get_mut(name)
    }

    /// Returns the bucket called `name`, creating it empty when absent.
    pub fn ensure_bucket(&mut self, name: &str) -> &mut GenreBucket {
        self.buckets
            .entry(name.to_string())
            .or_insert_with(|| GenreBucket::new(name))
    }

    pub fn insert_bucket(&mut self, bucket: GenreBucket) -> Option<GenreBucket> {
        self.buckets.insert(bucket.name.clone(), bucket)
    }

    pub fn remove_bucket(&mut self, name: &str) -> Option<GenreBucket> {
        self.buckets.remove(name)
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (name, bucket) in &self.buckets {
            if name.trim().is_empty() {
                return Err(SnapshotError::EmptyBucketName);
            }
            for track in &bucket.tracks {
                if track.uri.is_empty() {
                    return Err(SnapshotError::EmptyTrackUri {
                        bucket: name.clone(),
                    });
                }
                if let Some(first) = seen.insert(track.uri.as_str(), name.as_str()) {
                    return Err(SnapshotError::DuplicateTrack {
                        uri: track.uri.clone(),
                        first: first.to_string(),
                        second: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// blake3 digest over the full content; equal snapshots give equal digests.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for bucket in self.buckets.values() {
            hasher.update(bucket.name.as_bytes());
            hasher.update(&[FIELD_SEP]);
            hasher.update(&(bucket.tracks.len() as u64).to_le_bytes());
            for track in &bucket.tracks {
                hasher.update(track.uri.as_bytes());
                hasher.update(&[FIELD_SEP]);
                hasher.update(track.name.as_bytes());
                hasher.update(&[FIELD_SEP]);
                hasher.update(track.artist.as_bytes());
                hasher.update(&[FIELD_SEP]);
                match &track.image_url {
                    Some(url) => {
                        hasher.update(&[1]);
                        hasher.update(url.as_bytes());
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
                hasher.update(&[RECORD_SEP]);
            }
            hasher.update(&[RECORD_SEP]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.buckets.len()))?;
        for (name, bucket) in &self.buckets {
            map.serialize_entry(name, &bucket.tracks)?;
        }
        map.end()
    }
}

impl TryFrom<BTreeMap<String, Vec<Track>>> for Snapshot {
    type Error = SnapshotError;

    fn try_from(raw: BTreeMap<String, Vec<Track>>) -> Result<Self, Self::Error> {
        let buckets = raw
            .into_iter()
            .map(|(name, tracks)| (name.clone(), GenreBucket::with_tracks(name, tracks)))
            .collect();
        let snapshot = Snapshot { buckets };
        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    EmptyBucketName,
    DuplicateBucket(String),
    EmptyTrackUri {
        bucket: String,
    },
    DuplicateTrack {
        uri: String,
        first: String,
        second: String,
    },
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::EmptyBucketName => write!(f, "bucket name must not be empty"),
            SnapshotError::DuplicateBucket(name) => write!(f, "duplicate bucket: {}", name),
            SnapshotError::EmptyTrackUri { bucket } => {
                write!(f, "track without uri in bucket {}", bucket)
            }
            SnapshotError::DuplicateTrack { uri, first, second } => write!(
                f,
                "track {} appears in both {} and {}",
                uri, first, second
            ),
        }
    }
}

impl std::error::Error for SnapshotError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(uri: &str, artist: &str) -> Track {
        Track {
            uri: uri.to_string(),
            name: format!("Song {}", uri),
            artist: artist.to_string(),
            image_url: None,
        }
    }

    fn sample() -> Snapshot {
        Snapshot::from_buckets(vec![
            GenreBucket::with_tracks("rock", vec![track("a", "X"), track("b", "Y")]),
            GenreBucket::with_tracks("pop", vec![track("c", "Z")]),
        ])
        .unwrap()
    }

    #[test]
    fn digest_is_deterministic() {
        let first = sample();
        let second = sample();
        assert_eq!(first.digest(), second.digest());

        let mut moved = sample();
        let b = moved.bucket_mut("rock").unwrap().remove("b").unwrap();
        moved.ensure_bucket("pop").push(b);
        assert_ne!(first.digest(), moved.digest());
    }

    #[test]
    fn rejects_duplicate_uris() {
        let err = Snapshot::from_buckets(vec![
            GenreBucket::with_tracks("rock", vec![track("a", "X")]),
            GenreBucket::with_tracks("pop", vec![track("a", "X")]),
        ])
        .unwrap_err();
        assert!(matches!(err, SnapshotError::DuplicateTrack { .. }));
    }

    #[test]
    fn rejects_blank_bucket_name() {
        let err = Snapshot::from_buckets(vec![GenreBucket::new("  ")]).unwrap_err();
        assert_eq!(err, SnapshotError::EmptyBucketName);
    }

    #[test]
    fn serializes_as_name_to_tracks() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["rock"][1]["uri"], "b");
        assert_eq!(json["pop"][0]["artist"], "Z");
        assert!(json["pop"][0]["imageUrl"].is_null());

        let parsed: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn deserialize_validates() {
        let raw = r#"{"rock":[{"uri":"a","name":"n","artist":"x"}],"pop":[{"uri":"a","name":"n","artist":"x"}]}"#;
        assert!(serde_json::from_str::<Snapshot>(raw).is_err());
    }

    #[test]
    fn take_where_keeps_order() {
        let mut bucket = GenreBucket::with_tracks(
            "rock",
            vec![track("a", "X"), track("b", "Y"), track("c", "X")],
        );
        let taken = bucket.take_where(|t| t.artist == "X");
        let taken: Vec<&str> = taken.iter().map(|t| t.uri.as_str()).collect();
        assert_eq!(taken, vec!["a", "c"]);
        assert_eq!(bucket.tracks()[0].uri, "b");
    }

    #[test]
    fn locate_finds_bucket() {
        let snapshot = sample();
        assert_eq!(snapshot.locate("c"), Some("pop"));
        assert_eq!(snapshot.locate("zz"), None);
        assert_eq!(snapshot.track_count(), 3);
    }
}
