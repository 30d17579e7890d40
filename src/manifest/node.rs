//! Tagged manifest tree
//!
//! A deliberately small value model: a node is a scalar, an ordered
//! sequence, or an insertion-ordered mapping. Conversions to and from the
//! config library's value type live here so the rest of the crate never
//! touches the library directly.

/// Leaf value in the manifest tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A node in the manifest tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

impl Node {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn string(value: impl Into<String>) -> Node {
        Node::Scalar(Scalar::Str(value.into()))
    }
}

/// Insertion-ordered string-keyed mapping.
///
/// Backed by a plain vector; manifest mappings are small and lookups are
/// by short literal keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(String, Node)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Replace the value for `key` in place, or append a new entry.
    pub fn set(&mut self, key: &str, value: Node) {
        match self.get_mut(key) {
            Some(slot) => *slot = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get_index(&self, index: usize) -> (&str, &Node) {
        let (k, v) = &self.entries[index];
        (k, v)
    }

    pub fn get_index_mut(&mut self, index: usize) -> (&str, &mut Node) {
        let (k, v) = &mut self.entries[index];
        (k, v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<serde_yaml::Value> for Node {
    fn from(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Node::Scalar(Scalar::Null),
            serde_yaml::Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Scalar(Scalar::Int(i))
                } else {
                    Node::Scalar(Scalar::Float(n.as_f64().unwrap_or(0.0)))
                }
            }
            serde_yaml::Value::String(s) => Node::Scalar(Scalar::Str(s)),
            serde_yaml::Value::Sequence(items) => {
                Node::Sequence(items.into_iter().map(Node::from).collect())
            }
            serde_yaml::Value::Mapping(map) => {
                let mut out = Mapping::new();
                for (key, value) in map {
                    out.entries.push((key_to_string(key), Node::from(value)));
                }
                Node::Mapping(out)
            }
            serde_yaml::Value::Tagged(tagged) => Node::from(tagged.value),
        }
    }
}

impl From<Node> for serde_yaml::Value {
    fn from(node: Node) -> Self {
        match node {
            Node::Scalar(Scalar::Null) => serde_yaml::Value::Null,
            Node::Scalar(Scalar::Bool(b)) => serde_yaml::Value::Bool(b),
            Node::Scalar(Scalar::Int(i)) => serde_yaml::Value::Number(i.into()),
            Node::Scalar(Scalar::Float(f)) => {
                serde_yaml::Value::Number(serde_yaml::Number::from(f))
            }
            Node::Scalar(Scalar::Str(s)) => serde_yaml::Value::String(s),
            Node::Sequence(items) => serde_yaml::Value::Sequence(
                items.into_iter().map(serde_yaml::Value::from).collect(),
            ),
            Node::Mapping(map) => {
                let mut out = serde_yaml::Mapping::new();
                for (key, value) in map.entries {
                    out.insert(
                        serde_yaml::Value::String(key),
                        serde_yaml::Value::from(value),
                    );
                }
                serde_yaml::Value::Mapping(out)
            }
        }
    }
}

fn key_to_string(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(&other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_set_replaces_in_place() {
        let mut map = Mapping::new();
        map.set("filename", Node::string("a.bin"));
        map.set("sha256", Node::string("deadbeef"));
        map.set("filename", Node::string("a.bin.zlib"));

        assert_eq!(map.len(), 2);
        assert_eq!(map.get_index(0).0, "filename");
        assert_eq!(map.get("filename").and_then(Node::as_str), Some("a.bin.zlib"));
    }

    #[test]
    fn test_mapping_set_appends_new_keys() {
        let mut map = Mapping::new();
        map.set("filename", Node::string("a.bin"));
        map.set("ivt", Node::string("00112233"));

        assert_eq!(map.get_index(1).0, "ivt");
    }

    #[test]
    fn test_scalar_conversions() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("compressed: true\ncount: 3").unwrap();
        let node = Node::from(yaml);
        let map = node.as_mapping().unwrap();

        assert_eq!(map.get("compressed").and_then(Node::as_scalar), Some(&Scalar::Bool(true)));
        assert_eq!(map.get("count").and_then(Node::as_scalar), Some(&Scalar::Int(3)));
    }
}
