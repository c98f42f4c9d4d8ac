use crate::error::{Error, NameError, Result};
use crate::storage::KeyValueStore;
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub const MAX_NAME_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Points-style metrics.
    HigherIsBetter,
    /// Time-style metrics such as reaction milliseconds.
    LowerIsBetter,
}

impl SortDirection {
    /// Order two metrics so that the better one sorts first.
    pub fn compare(&self, a: f64, b: f64) -> Ordering {
        match self {
            SortDirection::HigherIsBetter => b.total_cmp(&a),
            SortDirection::LowerIsBetter => a.total_cmp(&b),
        }
    }

    pub fn is_better(&self, candidate: f64, current: f64) -> bool {
        self.compare(candidate, current) == Ordering::Less
    }
}

/// Primitive metadata value carried alongside an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(MetaValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(MetaValue::Int)
                .or_else(|| n.as_f64().map(MetaValue::Float)),
            Value::String(s) => Some(MetaValue::Text(s.clone())),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::Int(i) => Value::from(*i),
            MetaValue::Float(f) => Value::from(*f),
            MetaValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        MetaValue::Int(i)
    }
}

impl From<u32> for MetaValue {
    fn from(i: u32) -> Self {
        MetaValue::Int(i as i64)
    }
}

impl From<f64> for MetaValue {
    fn from(f: f64) -> Self {
        MetaValue::Float(f)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

pub type Metadata = BTreeMap<String, MetaValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub metric: f64,
    pub metadata: Metadata,
}

impl LeaderboardEntry {
    fn to_json(&self, metric_field: &str) -> Value {
        let mut obj = Map::new();
        for (k, v) in &self.metadata {
            obj.insert(k.clone(), v.to_json());
        }
        obj.insert("name".into(), Value::String(self.name.clone()));
        obj.insert(metric_field.into(), Value::from(self.metric));
        Value::Object(obj)
    }

    fn from_json(value: &Value, metric_field: &str) -> Option<Self> {
        let obj = value.as_object()?;
        let name = obj.get("name")?.as_str()?.to_string();
        let metric = obj.get(metric_field)?.as_f64()?;
        if name.is_empty() || !metric.is_finite() {
            return None;
        }
        let metadata = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "name" && k.as_str() != metric_field)
            .filter_map(|(k, v)| MetaValue::from_json(v).map(|m| (k.clone(), m)))
            .collect();
        Some(Self {
            name,
            metric,
            metadata,
        })
    }
}

/// Check a submitted player name, returning it trimmed.
///
/// Accepted names are 1 to 20 ASCII letters and digits and not only digits.
pub fn validate_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    let reason = if name.is_empty() {
        Some(NameError::Empty)
    } else if name.chars().count() > MAX_NAME_LEN {
        Some(NameError::TooLong)
    } else if name.chars().all(|c| c.is_ascii_digit()) {
        Some(NameError::NumericOnly)
    } else if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(NameError::NotAlphanumeric)
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidName { reason }),
        None => Ok(name.to_string()),
    }
}

/// Layout and ranking rule for one board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub storage_key: String,
    /// JSON field holding the metric, e.g. `score`, `react`, `wpm`.
    pub metric_field: String,
    pub direction: SortDirection,
    /// Keep at most this many entries; `None` keeps everything.
    pub cap: Option<usize>,
    /// Separate key for the scalar best score.
    pub high_score_key: Option<String>,
}

impl BoardSpec {
    pub fn new(storage_key: &str, metric_field: &str, direction: SortDirection) -> Self {
        Self {
            storage_key: storage_key.to_string(),
            metric_field: metric_field.to_string(),
            direction,
            cap: None,
            high_score_key: None,
        }
    }

    pub fn with_cap(mut self, cap: Option<usize>) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_high_score_key(mut self, key: &str) -> Self {
        self.high_score_key = Some(key.to_string());
        self
    }

    fn compare(&self, a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
        self.direction
            .compare(a.metric, b.metric)
            .then_with(|| a.name.cmp(&b.name))
    }
}

#[derive(Debug)]
struct Board {
    spec: BoardSpec,
    entries: Vec<LeaderboardEntry>,
}

pub struct LeaderboardStore<S: KeyValueStore> {
    store: S,
    boards: HashMap<String, Board>,
}

impl<S: KeyValueStore> LeaderboardStore<S> {
    /// Register `specs` and load each board from `store`.
    pub fn new(store: S, specs: impl IntoIterator<Item = BoardSpec>) -> Self {
        let mut lb = Self {
            store,
            boards: HashMap::new(),
        };
        for spec in specs {
            lb.register(spec);
        }
        lb
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn register(&mut self, spec: BoardSpec) {
        let key = spec.storage_key.clone();
        self.boards.insert(
            key.clone(),
            Board {
                spec,
                entries: Vec::new(),
            },
        );
        self.load(&key);
    }

    pub fn spec(&self, key: &str) -> Option<&BoardSpec> {
        self.boards.get(key).map(|b| &b.spec)
    }

    fn board_entry(&mut self, key: &str) -> &mut Board {
        self.boards.entry(key.to_string()).or_insert_with(|| {
            warn!(key, "unregistered leaderboard, ranking higher scores first");
            Board {
                spec: BoardSpec::new(key, "score", SortDirection::HigherIsBetter),
                entries: Vec::new(),
            }
        })
    }

    /// The board for `key`, read from storage first if it was never loaded.
    fn board_mut(&mut self, key: &str) -> &mut Board {
        if !self.boards.contains_key(key) {
            self.load(key);
        }
        self.board_entry(key)
    }

    /// Re-read a board from storage. Missing or malformed data yields an
    /// empty board; individually malformed entries are skipped.
    pub fn load(&mut self, key: &str) -> &[LeaderboardEntry] {
        let raw = match self.store.get(key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "leaderboard unreadable, starting empty");
                None
            }
        };
        let board = self.board_entry(key);
        let parsed: Option<Vec<Value>> = raw.and_then(|text| match serde_json::from_str(&text) {
            Ok(Value::Array(items)) => Some(items),
            Ok(_) | Err(_) => {
                warn!(key, "stored leaderboard is malformed, starting empty");
                None
            }
        });

        let spec = board.spec.clone();
        let mut entries: Vec<LeaderboardEntry> = parsed
            .unwrap_or_default()
            .iter()
            .filter_map(|v| LeaderboardEntry::from_json(v, &spec.metric_field))
            .sorted_by(|a, b| spec.compare(a, b))
            .collect();
        if let Some(cap) = spec.cap {
            entries.truncate(cap);
        }
        debug!(key, entries = entries.len(), "leaderboard loaded");
        board.entries = entries;
        &board.entries
    }

    /// Validate and add an entry, re-sort, trim to the cap and write the
    /// board through to storage. Returns the entry's rank (0 = best), or
    /// `None` if the cap pushed it straight off the board.
    pub fn submit(
        &mut self,
        key: &str,
        name: &str,
        metric: f64,
        metadata: Metadata,
    ) -> Result<Option<usize>> {
        let name = validate_name(name)?;
        if !metric.is_finite() {
            return Err(Error::InvalidMetric { value: metric });
        }

        let board = self.board_mut(key);
        let mut metadata = metadata;
        metadata.remove("name");
        metadata.remove(&board.spec.metric_field);
        metadata
            .entry("timestamp".to_string())
            .or_insert_with(|| MetaValue::Text(Utc::now().to_rfc3339()));

        let entry = LeaderboardEntry {
            name,
            metric,
            metadata,
        };
        board.entries.push(entry.clone());
        let spec = board.spec.clone();
        board.entries.sort_by(|a, b| spec.compare(a, b));
        if let Some(cap) = spec.cap {
            board.entries.truncate(cap);
        }
        let rank = board.entries.iter().position(|e| *e == entry);
        info!(key, name = %entry.name, metric, ?rank, "leaderboard entry added");

        self.persist(key)?;
        Ok(rank)
    }

    fn persist(&mut self, key: &str) -> Result<()> {
        let Some(board) = self.boards.get(key) else {
            return Ok(());
        };
        let doc = Value::Array(
            board
                .entries
                .iter()
                .map(|e| e.to_json(&board.spec.metric_field))
                .collect(),
        );
        let text = serde_json::to_string(&doc)?;
        self.store.set(key, &text).map_err(|e| {
            warn!(key, error = %e, "leaderboard write failed, keeping entries in memory");
            match e {
                Error::Persistence { .. } => e,
                other => Error::persistence(other.to_string()),
            }
        })
    }

    /// Best `n` entries in board order.
    pub fn top_n(&self, key: &str, n: usize) -> &[LeaderboardEntry] {
        let entries = self.entries(key);
        &entries[..n.min(entries.len())]
    }

    /// Best `n` entries whose metadata `field` equals `value`, e.g. one
    /// game mode or difficulty.
    pub fn filtered_top_n(
        &self,
        key: &str,
        n: usize,
        field: &str,
        value: &MetaValue,
    ) -> Vec<&LeaderboardEntry> {
        self.entries(key)
            .iter()
            .filter(|e| e.metadata.get(field) == Some(value))
            .take(n)
            .collect()
    }

    pub fn entries(&self, key: &str) -> &[LeaderboardEntry] {
        self.boards
            .get(key)
            .map(|b| b.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self, key: &str) -> usize {
        self.entries(key).len()
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.entries(key).is_empty()
    }

    /// Stored best score for a board; absent or malformed reads as `None`.
    pub fn high_score(&self, key: &str) -> Option<f64> {
        let hs_key = self.spec(key)?.high_score_key.as_deref()?;
        let raw = self.store.get(hs_key).ok().flatten()?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(v) => v.as_f64().filter(|f| f.is_finite()),
            Err(_) => raw.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        }
    }

    /// Store `value` as the board's best score if it beats the current one.
    pub fn offer_high_score(&mut self, key: &str, value: f64) -> Result<bool> {
        if !value.is_finite() {
            return Err(Error::InvalidMetric { value });
        }
        let Some(spec) = self.spec(key).cloned() else {
            return Ok(false);
        };
        let Some(hs_key) = spec.high_score_key else {
            return Ok(false);
        };
        if let Some(current) = self.high_score(key) {
            if !spec.direction.is_better(value, current) {
                return Ok(false);
            }
        }
        let text = serde_json::to_string(&value)?;
        self.store.set(&hs_key, &text).map_err(|e| {
            warn!(key = %hs_key, error = %e, "high score write failed");
            match e {
                Error::Persistence { .. } => e,
                other => Error::persistence(other.to_string()),
            }
        })?;
        info!(key = %hs_key, value, "new high score");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn points() -> BoardSpec {
        BoardSpec::new("hitplayers", "score", SortDirection::HigherIsBetter)
            .with_high_score_key("precisionhighscore")
    }

    fn reaction() -> BoardSpec {
        BoardSpec::new("reflexplayers", "react", SortDirection::LowerIsBetter)
            .with_high_score_key("reflexhighscore")
    }

    fn names(entries: &[LeaderboardEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn name_rules() {
        for bad in ["", "   ", "abcdefghijklmnopqrstu", "12345", "bob!", "two words"] {
            assert_matches!(validate_name(bad), Err(Error::InvalidName { .. }), "{bad:?}");
        }
        assert_matches!(
            validate_name("12345"),
            Err(Error::InvalidName { reason: NameError::NumericOnly })
        );
        assert_matches!(
            validate_name("bob!"),
            Err(Error::InvalidName { reason: NameError::NotAlphanumeric })
        );
        assert_eq!(validate_name("ALICE").unwrap(), "ALICE");
        assert_eq!(validate_name("bob123").unwrap(), "bob123");
        assert_eq!(validate_name(" ace1 ").unwrap(), "ace1");
        assert_eq!(validate_name("abcdefghijklmnopqrst").unwrap().len(), 20);
    }

    #[test]
    fn higher_scores_rank_first_ties_by_name() {
        let mut lb = LeaderboardStore::new(MemoryStore::new(), [points()]);
        lb.submit("hitplayers", "zed", 3.0, Metadata::new()).unwrap();
        lb.submit("hitplayers", "amy", 3.0, Metadata::new()).unwrap();
        let rank = lb.submit("hitplayers", "ACE1", 5.0, Metadata::new()).unwrap();
        assert_eq!(rank, Some(0));
        assert_eq!(names(lb.entries("hitplayers")), vec!["ACE1", "amy", "zed"]);
        assert_eq!(names(lb.top_n("hitplayers", 2)), vec!["ACE1", "amy"]);
        assert_eq!(lb.top_n("hitplayers", 10).len(), 3);
    }

    #[test]
    fn lower_reaction_times_rank_first() {
        let mut lb = LeaderboardStore::new(MemoryStore::new(), [reaction()]);
        lb.submit("reflexplayers", "slow", 420.0, Metadata::new()).unwrap();
        lb.submit("reflexplayers", "fast", 180.0, Metadata::new()).unwrap();
        assert_eq!(names(lb.entries("reflexplayers")), vec!["fast", "slow"]);
    }

    #[test]
    fn submit_writes_through() {
        let mut lb = LeaderboardStore::new(MemoryStore::new(), [points()]);
        let mut meta = Metadata::new();
        meta.insert("accuracy".into(), MetaValue::from(90u32));
        lb.submit("hitplayers", "ACE1", 5.0, meta).unwrap();

        let raw = lb.store().get("hitplayers").unwrap().unwrap();
        let doc: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc[0]["name"], "ACE1");
        assert_eq!(doc[0]["score"], 5.0);
        assert_eq!(doc[0]["accuracy"], 90);
        assert!(doc[0]["timestamp"].is_string());

        // A second store over the same data sees the entry.
        let reopened = LeaderboardStore::new(lb.store().clone(), [points()]);
        assert_eq!(names(reopened.entries("hitplayers")), vec!["ACE1"]);
        assert_eq!(
            reopened.entries("hitplayers")[0].metadata.get("accuracy"),
            Some(&MetaValue::Int(90))
        );
    }

    #[test]
    fn invalid_name_changes_nothing() {
        let mut lb = LeaderboardStore::new(MemoryStore::new(), [points()]);
        assert_matches!(
            lb.submit("hitplayers", "bob!", 9.0, Metadata::new()),
            Err(Error::InvalidName { .. })
        );
        assert!(lb.is_empty("hitplayers"));
        assert_eq!(lb.store().get("hitplayers").unwrap(), None);
        assert_matches!(
            lb.submit("hitplayers", "bob", f64::NAN, Metadata::new()),
            Err(Error::InvalidMetric { .. })
        );
    }

    #[test]
    fn corrupt_data_loads_empty() {
        for raw in ["not json", "{\"name\":\"x\"}", "42", "null"] {
            let mut store = MemoryStore::new();
            store.set("hitplayers", raw).unwrap();
            let lb = LeaderboardStore::new(store, [points()]);
            assert!(lb.is_empty("hitplayers"), "{raw}");
        }
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let mut store = MemoryStore::new();
        store
            .set(
                "hitplayers",
                r#"[{"name":"ok","score":2},{"name":"noscore"},7,{"score":9},{"name":"top","score":"x"},{"name":"best","score":4,"mode":"classic","nested":{"a":1}}]"#,
            )
            .unwrap();
        let lb = LeaderboardStore::new(store, [points()]);
        assert_eq!(names(lb.entries("hitplayers")), vec!["best", "ok"]);
        let best = &lb.entries("hitplayers")[0];
        assert_eq!(best.metadata.get("mode"), Some(&MetaValue::from("classic")));
        assert!(!best.metadata.contains_key("nested"));
    }

    #[test]
    fn unregistered_board_keeps_stored_entries() {
        let mut store = MemoryStore::new();
        store.set("players", r#"[{"name":"old","score":9}]"#).unwrap();
        let mut lb = LeaderboardStore::new(store, Vec::<BoardSpec>::new());

        assert_eq!(lb.submit("players", "newbie", 1.0, Metadata::new()).unwrap(), Some(1));
        assert_eq!(names(lb.entries("players")), vec!["old", "newbie"]);

        let doc: Value = serde_json::from_str(&lb.store().get("players").unwrap().unwrap()).unwrap();
        assert_eq!(doc.as_array().unwrap().len(), 2);
        assert_eq!(doc[0]["name"], "old");
    }

    #[test]
    fn cap_retains_best_entries() {
        let mut lb = LeaderboardStore::new(MemoryStore::new(), [points().with_cap(Some(2))]);
        lb.submit("hitplayers", "a", 1.0, Metadata::new()).unwrap();
        lb.submit("hitplayers", "b", 3.0, Metadata::new()).unwrap();
        lb.submit("hitplayers", "c", 2.0, Metadata::new()).unwrap();
        assert_eq!(names(lb.entries("hitplayers")), vec!["b", "c"]);
        assert_eq!(lb.submit("hitplayers", "d", 0.0, Metadata::new()).unwrap(), None);
    }

    #[test]
    fn failed_write_keeps_memory_and_old_data() {
        let mut lb = LeaderboardStore::new(MemoryStore::with_quota(120), [points()]);
        lb.submit("hitplayers", "first", 1.0, Metadata::new()).unwrap();
        let before = lb.store().get("hitplayers").unwrap();

        let mut big = Metadata::new();
        big.insert("note".into(), MetaValue::from("x".repeat(200)));
        let err = lb.submit("hitplayers", "second", 2.0, big).unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(names(lb.entries("hitplayers")), vec!["second", "first"]);
        assert_eq!(lb.store().get("hitplayers").unwrap(), before);
    }

    #[test]
    fn filtered_top_by_mode() {
        let mut lb = LeaderboardStore::new(MemoryStore::new(), [points()]);
        for (name, score, mode) in [("a", 5.0, "rapid"), ("b", 4.0, "classic"), ("c", 3.0, "rapid")] {
            let mut meta = Metadata::new();
            meta.insert("gameMode".into(), MetaValue::from(mode));
            lb.submit("hitplayers", name, score, meta).unwrap();
        }
        let rapid = lb.filtered_top_n("hitplayers", 3, "gameMode", &MetaValue::from("rapid"));
        assert_eq!(rapid.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn high_score_follows_direction() {
        let mut lb = LeaderboardStore::new(MemoryStore::new(), [points(), reaction()]);
        assert_eq!(lb.high_score("hitplayers"), None);
        assert!(lb.offer_high_score("hitplayers", 5.0).unwrap());
        assert!(!lb.offer_high_score("hitplayers", 4.0).unwrap());
        assert!(!lb.offer_high_score("hitplayers", 5.0).unwrap());
        assert_eq!(lb.high_score("hitplayers"), Some(5.0));

        assert!(lb.offer_high_score("reflexplayers", 300.0).unwrap());
        assert!(lb.offer_high_score("reflexplayers", 250.0).unwrap());
        assert!(!lb.offer_high_score("reflexplayers", 260.0).unwrap());
        assert_eq!(lb.high_score("reflexplayers"), Some(250.0));
    }

    #[test]
    fn malformed_high_score_reads_as_none() {
        let mut store = MemoryStore::new();
        store.set("precisionhighscore", "\"abc\"").unwrap();
        let mut lb = LeaderboardStore::new(store, [points()]);
        assert_eq!(lb.high_score("hitplayers"), None);
        assert!(lb.offer_high_score("hitplayers", 1.0).unwrap());
    }

    proptest! {
        #[test]
        fn top_n_is_prefix_of_sorted_order(
            subs in proptest::collection::vec(("[a-e]{1,3}", 0u32..20), 0..40),
            n in 0usize..50,
            lower in any::<bool>(),
        ) {
            let direction = if lower { SortDirection::LowerIsBetter } else { SortDirection::HigherIsBetter };
            let spec = BoardSpec::new("k", "score", direction);
            let mut lb = LeaderboardStore::new(MemoryStore::new(), [spec.clone()]);
            for (name, score) in &subs {
                lb.submit("k", name, *score as f64, Metadata::new()).unwrap();
            }
            let all = lb.entries("k");
            prop_assert_eq!(all.len(), subs.len());
            for pair in all.windows(2) {
                prop_assert_ne!(spec.compare(&pair[0], &pair[1]), Ordering::Greater);
            }
            let top = lb.top_n("k", n);
            prop_assert_eq!(top, &all[..n.min(all.len())]);
        }
    }
}
