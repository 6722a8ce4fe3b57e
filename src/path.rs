//! Structural paths and the flat codec.
//!
//! A [`Path`] addresses exactly one node in a JSON tree as a sequence of
//! typed segments (object key or array index). The dotted string form
//! (`hero.ctas[2].label`) exists for state files and diagnostics only and is
//! produced/parsed exclusively here — nothing else in the crate splits path
//! strings by hand.
//!
//! [`flatten`] and [`unflatten`] convert between a tree and a map of paths to
//! scalar leaves. Empty objects and arrays produce no entries, so the flat
//! form cannot distinguish "present but empty" from "absent"; callers that
//! care about shape recover it from the source tree during structure sync.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde_json::Value;

/// One step into a JSON tree: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// An ordered sequence of segments addressing one node.
///
/// Two paths are equal iff their segment sequences are equal. The empty path
/// addresses the tree root (a scalar document flattens to a single entry
/// under the empty path).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Single-key path, the usual way a block name becomes a path prefix.
    pub fn key(name: &str) -> Self {
        Self {
            segments: vec![Segment::Key(name.to_string())],
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child_key(&self, name: &str) -> Path {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(name.to_string()));
        Path { segments }
    }

    pub fn child_index(&self, index: usize) -> Path {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Path { segments }
    }

    /// Concatenate another path onto this one.
    pub fn join(&self, rest: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(rest.segments.iter().cloned());
        Path { segments }
    }

    /// True when `prefix` is a leading subsequence of this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// The top-level object key this path lives under, if any.
    pub fn head_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(k) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", k)?;
                }
                Segment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = anyhow::Error;

    /// Parse the dotted/bracketed form produced by [`fmt::Display`].
    ///
    /// Keys are assumed not to contain `.` or `[` — the document schemas this
    /// tool synchronizes use plain identifier-like keys.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'[' => {
                    let close = match s[i..].find(']') {
                        Some(offset) => i + offset,
                        None => bail!("unterminated index in path '{}'", s),
                    };
                    let index: usize = s[i + 1..close]
                        .parse()
                        .map_err(|_| anyhow::anyhow!("invalid index in path '{}'", s))?;
                    segments.push(Segment::Index(index));
                    i = close + 1;
                }
                b'.' => i += 1,
                _ => {
                    let mut j = i;
                    while j < bytes.len() && bytes[j] != b'.' && bytes[j] != b'[' {
                        j += 1;
                    }
                    segments.push(Segment::Key(s[i..j].to_string()));
                    i = j;
                }
            }
        }
        Ok(Path { segments })
    }
}

/// A tree decomposed into scalar leaves keyed by path.
pub type FlatMap = BTreeMap<Path, Value>;

/// Decompose `tree` into its scalar leaves.
///
/// Deterministic; recursion depth bounded by the input. Empty containers
/// yield no entries (see module docs).
pub fn flatten(tree: &Value) -> FlatMap {
    let mut flat = FlatMap::new();
    flatten_into(tree, Path::root(), &mut flat);
    flat
}

fn flatten_into(node: &Value, prefix: Path, flat: &mut FlatMap) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, prefix.child_key(key), flat);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, prefix.child_index(index), flat);
            }
        }
        scalar => {
            flat.insert(prefix, scalar.clone());
        }
    }
}

/// Intermediate shape used while rebuilding a tree; arrays are kept sparse
/// until the end so insertion order cannot affect the result.
enum Node {
    Object(BTreeMap<String, Node>),
    Array(BTreeMap<usize, Node>),
    Leaf(Value),
}

impl Node {
    fn for_segment(segment: &Segment) -> Node {
        match segment {
            Segment::Key(_) => Node::Object(BTreeMap::new()),
            Segment::Index(_) => Node::Array(BTreeMap::new()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Node::Leaf(value) => value,
            Node::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, node)| (k, node.into_value()))
                    .collect(),
            ),
            // Gaps are compacted: indices are ordinals, not sparse slots.
            Node::Array(map) => {
                Value::Array(map.into_values().map(Node::into_value).collect())
            }
        }
    }
}

/// Rebuild a tree from its flat form. Inverse of [`flatten`] for trees
/// without empty containers; independent of map iteration order.
pub fn unflatten(flat: &FlatMap) -> Value {
    if flat.is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    if let Some(value) = flat.get(&Path::root()) {
        return value.clone();
    }

    let first_segment = flat
        .keys()
        .next()
        .and_then(|p| p.segments().first())
        .expect("non-empty flat map has a first path");
    let mut root = Node::for_segment(first_segment);

    for (path, value) in flat {
        insert(&mut root, path.segments(), value);
    }
    root.into_value()
}

fn insert(node: &mut Node, segments: &[Segment], value: &Value) {
    let (segment, rest) = match segments.split_first() {
        Some(split) => split,
        None => {
            *node = Node::Leaf(value.clone());
            return;
        }
    };

    // A leaf (or wrong container kind) in the way is replaced; well-formed
    // flatten output never triggers this.
    match (segment, &mut *node) {
        (Segment::Key(_), Node::Object(_)) | (Segment::Index(_), Node::Array(_)) => {}
        _ => *node = Node::for_segment(segment),
    }

    let child = match (segment, node) {
        (Segment::Key(key), Node::Object(map)) => map
            .entry(key.clone())
            .or_insert_with(|| child_node(rest, value)),
        (Segment::Index(index), Node::Array(map)) => map
            .entry(*index)
            .or_insert_with(|| child_node(rest, value)),
        _ => unreachable!("node was normalized to match the segment kind"),
    };
    if !rest.is_empty() {
        insert(child, rest, value);
    } else {
        *child = Node::Leaf(value.clone());
    }
}

fn child_node(rest: &[Segment], value: &Value) -> Node {
    match rest.first() {
        Some(segment) => Node::for_segment(segment),
        None => Node::Leaf(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> Path {
        s.parse().expect("valid path")
    }

    // ==================== Path Type Tests ====================

    #[test]
    fn test_path_equality_is_segment_equality() {
        let a = Path::key("hero").child_key("title");
        let b = path("hero.title");
        assert_eq!(a, b);
    }

    #[test]
    fn test_path_display_round_trip() {
        for s in ["hero.title", "countries.FR.rules[2].text", "[0].name", "a"] {
            assert_eq!(path(s).to_string(), s);
        }
    }

    #[test]
    fn test_path_parse_rejects_unterminated_index() {
        assert!("a[2".parse::<Path>().is_err());
        assert!("a[x]".parse::<Path>().is_err());
    }

    #[test]
    fn test_path_starts_with() {
        let p = path("countries.FR.rules[0]");
        assert!(p.starts_with(&Path::key("countries")));
        assert!(p.starts_with(&path("countries.FR")));
        assert!(!p.starts_with(&Path::key("pricing")));
        assert!(Path::root().starts_with(&Path::root()));
    }

    #[test]
    fn test_path_join() {
        let joined = Path::key("countries").join(&path("FR.rules[0]"));
        assert_eq!(joined, path("countries.FR.rules[0]"));
        assert_eq!(joined.join(&Path::root()), joined);
    }

    #[test]
    fn test_path_head_key() {
        assert_eq!(path("hero.title").head_key(), Some("hero"));
        assert_eq!(Path::root().head_key(), None);
        assert_eq!(path("[1].x").head_key(), None);
    }

    #[test]
    fn test_path_ordering_is_stable() {
        let mut paths = vec![path("b"), path("a.z"), path("a[1]"), path("a.b")];
        paths.sort();
        let rendered: Vec<String> = paths.iter().map(Path::to_string).collect();
        let mut again = rendered.clone();
        again.sort_by_key(|s| s.parse::<Path>().unwrap());
        assert_eq!(rendered, again);
    }

    // ==================== Flatten Tests ====================

    #[test]
    fn test_flatten_nested_object() {
        let tree = json!({"hero": {"title": "Hi", "ctas": ["Buy", "Try"]}, "n": 3});
        let flat = flatten(&tree);

        assert_eq!(flat.len(), 4);
        assert_eq!(flat[&path("hero.title")], json!("Hi"));
        assert_eq!(flat[&path("hero.ctas[0]")], json!("Buy"));
        assert_eq!(flat[&path("hero.ctas[1]")], json!("Try"));
        assert_eq!(flat[&path("n")], json!(3));
    }

    #[test]
    fn test_flatten_scalar_root() {
        let flat = flatten(&json!("hello"));
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[&Path::root()], json!("hello"));
    }

    #[test]
    fn test_flatten_empty_containers_yield_no_entries() {
        let tree = json!({"a": {}, "b": [], "c": "kept"});
        let flat = flatten(&tree);
        assert_eq!(flat.len(), 1);
        assert!(flat.contains_key(&path("c")));
    }

    #[test]
    fn test_flatten_preserves_null_leaves() {
        let flat = flatten(&json!({"a": null}));
        assert_eq!(flat[&path("a")], Value::Null);
    }

    // ==================== Unflatten Tests ====================

    #[test]
    fn test_unflatten_round_trip() {
        let tree = json!({
            "hero": {"title": "Hi", "sub": {"x": true}},
            "items": [{"k": "a"}, {"k": "b"}],
            "count": 12.5
        });
        assert_eq!(unflatten(&flatten(&tree)), tree);
    }

    #[test]
    fn test_unflatten_empty_map_is_empty_object() {
        assert_eq!(unflatten(&FlatMap::new()), json!({}));
    }

    #[test]
    fn test_unflatten_is_order_independent() {
        let tree = json!({"z": [1, 2, 3], "a": {"m": "x", "b": "y"}});
        let flat = flatten(&tree);

        // Rebuild from a reversed insertion order.
        let mut reversed = FlatMap::new();
        for (k, v) in flat.iter().rev() {
            reversed.insert(k.clone(), v.clone());
        }
        assert_eq!(unflatten(&reversed), tree);
    }

    #[test]
    fn test_unflatten_compacts_index_gaps() {
        let mut flat = FlatMap::new();
        flat.insert(path("list[0]"), json!("a"));
        flat.insert(path("list[5]"), json!("b"));
        assert_eq!(unflatten(&flat), json!({"list": ["a", "b"]}));
    }

    #[test]
    fn test_unflatten_scalar_root() {
        let mut flat = FlatMap::new();
        flat.insert(Path::root(), json!(42));
        assert_eq!(unflatten(&flat), json!(42));
    }

    // ==================== Property Tests ====================

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Scalar leaves only; no empty containers, so the round trip is exact.
        fn leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                "[a-z]{0,8}".prop_map(Value::from),
                any::<i32>().prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
                Just(Value::Null),
            ]
        }

        fn tree() -> impl Strategy<Value = Value> {
            leaf().prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 1..4).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 1..4).prop_map(|m| {
                        Value::Object(m.into_iter().collect())
                    }),
                ]
            })
        }

        proptest! {
            #[test]
            fn flatten_unflatten_round_trips(t in tree()) {
                prop_assert_eq!(unflatten(&flatten(&t)), t);
            }

            #[test]
            fn path_string_form_round_trips(t in tree()) {
                for p in flatten(&t).keys() {
                    let reparsed: Path = p.to_string().parse().unwrap();
                    prop_assert_eq!(&reparsed, p);
                }
            }
        }
    }
}
