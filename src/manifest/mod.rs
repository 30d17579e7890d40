//! Manifest tree representation and traversal
//!
//! The parsed manifest is held as a tagged tree of mappings, sequences,
//! and scalars, independent of the concrete config library used to parse
//! and serialize it. Mappings preserve declaration order; packaging order
//! and dedup first-seen order both derive from it.

mod node;
mod walk;

pub use node::{Mapping, Node, Scalar};
pub use walk::{filenames, for_each_entry};

/// Parse a structured-config document into a manifest tree.
pub fn parse_str(text: &str) -> Result<Node, serde_yaml::Error> {
    let value: serde_yaml::Value = serde_yaml::from_str(text)?;
    Ok(Node::from(value))
}

/// Serialize a manifest tree back to config text.
pub fn to_text(node: &Node) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&serde_yaml::Value::from(node.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_declaration_order() {
        let doc = "\
software:
  version: \"1.0\"
  images:
    - filename: zeta.bin
    - filename: alpha.bin
  scripts:
    - filename: post.sh
";
        let tree = parse_str(doc).unwrap();
        assert_eq!(filenames(&tree), vec!["zeta.bin", "alpha.bin", "post.sh"]);
    }

    #[test]
    fn test_round_trip_keeps_entries() {
        let doc = "software:\n  images:\n    - filename: a.bin\n      compressed: true\n";
        let tree = parse_str(doc).unwrap();
        let text = to_text(&tree).unwrap();
        let reparsed = parse_str(&text).unwrap();
        assert_eq!(filenames(&reparsed), vec!["a.bin"]);
    }
}
