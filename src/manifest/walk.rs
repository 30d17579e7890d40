//! Recursive discovery of artifact references
//!
//! Any mapping carrying a scalar `filename` key is an artifact entry. The
//! walk is depth-first in declaration order; an entry is visited exactly
//! once even when the same file is referenced from several entries (the
//! dedup happens later, keyed on the filename value).

use super::{Mapping, Node};

/// Visit every artifact entry under `node`, in document order.
///
/// The visitor receives the entry mapping mutably so the pipeline can
/// rewrite `filename`, `sha256`, and `ivt` in the tree that is later
/// serialized. The first error aborts the walk.
pub fn for_each_entry<E, F>(node: &mut Node, visit: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Mapping) -> Result<(), E>,
{
    match node {
        Node::Scalar(_) => Ok(()),
        Node::Sequence(items) => {
            for item in items {
                for_each_entry(item, visit)?;
            }
            Ok(())
        }
        Node::Mapping(map) => walk_mapping(map, visit),
    }
}

fn walk_mapping<E, F>(map: &mut Mapping, visit: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Mapping) -> Result<(), E>,
{
    let mut index = 0;
    while index < map.len() {
        let marks_entry = {
            let (key, value) = map.get_index(index);
            key == "filename" && matches!(value, Node::Scalar(_))
        };

        if marks_entry {
            visit(map)?;
        } else {
            let (_, value) = map.get_index_mut(index);
            for_each_entry(value, visit)?;
        }
        index += 1;
    }
    Ok(())
}

/// Collect the `filename` values of all entries, in walk order.
pub fn filenames(node: &Node) -> Vec<String> {
    fn collect(node: &Node, out: &mut Vec<String>) {
        match node {
            Node::Scalar(_) => {}
            Node::Sequence(items) => {
                for item in items {
                    collect(item, out);
                }
            }
            Node::Mapping(map) => {
                for (key, value) in map.iter() {
                    if key == "filename" {
                        if let Some(name) = value.as_str() {
                            out.push(name.to_string());
                        }
                    } else {
                        collect(value, out);
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    collect(node, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_str;
    use std::convert::Infallible;

    fn entry_count(tree: &mut Node) -> usize {
        let mut seen = 0;
        for_each_entry::<Infallible, _>(tree, &mut |_| {
            seen += 1;
            Ok(())
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_entries_found_at_any_depth() {
        let doc = "\
software:
  version: \"1.0\"
  stable:
    copy1:
      images:
        - filename: rootfs.ext4
          device: /dev/mmcblk0p2
    copy2:
      images:
        - filename: rootfs.ext4
          device: /dev/mmcblk0p3
  scripts:
    - filename: update.sh
";
        let mut tree = parse_str(doc).unwrap();
        assert_eq!(entry_count(&mut tree), 3);
        assert_eq!(
            filenames(&tree),
            vec!["rootfs.ext4", "rootfs.ext4", "update.sh"]
        );
    }

    #[test]
    fn test_mapping_without_filename_is_not_an_entry() {
        let doc = "software:\n  bootenv:\n    - name: bootcmd\n      value: run update\n";
        let mut tree = parse_str(doc).unwrap();
        assert_eq!(entry_count(&mut tree), 0);
    }

    #[test]
    fn test_visitor_mutations_are_visible_in_tree() {
        let doc = "software:\n  images:\n    - filename: a.bin\n";
        let mut tree = parse_str(doc).unwrap();

        for_each_entry::<Infallible, _>(&mut tree, &mut |entry| {
            entry.set("filename", Node::string("a.bin.enc"));
            entry.set("sha256", Node::string("cafe"));
            Ok(())
        })
        .unwrap();

        assert_eq!(filenames(&tree), vec!["a.bin.enc"]);
        let text = crate::manifest::to_text(&tree).unwrap();
        assert!(text.contains("sha256: cafe"));
    }

    #[test]
    fn test_walk_order_matches_declaration_order() {
        let doc = "\
software:
  images:
    - filename: z.bin
    - filename: a.bin
  files:
    - filename: m.cfg
";
        let tree = parse_str(doc).unwrap();
        assert_eq!(filenames(&tree), vec!["z.bin", "a.bin", "m.cfg"]);
    }

    #[test]
    fn test_walk_error_aborts() {
        let doc = "software:\n  images:\n    - filename: a.bin\n    - filename: b.bin\n";
        let mut tree = parse_str(doc).unwrap();

        let mut seen = 0;
        let result = for_each_entry::<&str, _>(&mut tree, &mut |_| {
            seen += 1;
            Err("boom")
        });

        assert_eq!(result, Err("boom"));
        assert_eq!(seen, 1);
    }
}
