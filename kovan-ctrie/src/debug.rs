//! Human-readable dump of the trie structure.

use crate::map::{ReadOnlyTrieMap, TrieMap};
use crate::node::{Branch, INode, Kind};
use crate::trie::RawTrie;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::fmt::{self, Debug, Display};
use core::hash::{BuildHasher, Hash};

/// Renders a trie one node per line, children indented under their parent.
struct TreeDump<'a, K, V>(&'a RawTrie<K, V>);

impl<K: Debug + 'static, V: Debug + 'static> TreeDump<'_, K, V> {
    fn write_inode(&self, f: &mut fmt::Formatter<'_>, inode: &Arc<INode<K, V>>, depth: usize) -> fmt::Result {
        let pad = depth * 2;
        let main = inode.gcas_read(self.0);
        writeln!(f, "{:pad$}INode gen={:p}", "", Arc::as_ptr(&inode.generation))?;

        let pad = pad + 2;
        match &main.kind {
            Kind::Compressed(cn) => {
                writeln!(f, "{:pad$}CNode bitmap={:#034b}", "", cn.bitmap)?;
                for branch in cn.array.iter() {
                    match branch {
                        Branch::Indirection(sub) => self.write_inode(f, sub, depth + 2)?,
                        Branch::Singleton(sn) => writeln!(
                            f,
                            "{:w$}SNode {:?} -> {:?} hash={:#010x}",
                            "",
                            sn.key,
                            sn.value,
                            sn.hash,
                            w = pad + 2
                        )?,
                    }
                }
            }
            Kind::Tomb(sn) => {
                writeln!(f, "{:pad$}TNode {:?} -> {:?} hash={:#010x}", "", sn.key, sn.value, sn.hash)?;
            }
            Kind::List(bucket) => {
                writeln!(f, "{:pad$}LNode", "")?;
                for sn in bucket.entries() {
                    writeln!(f, "{:w$}{:?} -> {:?}", "", sn.key, sn.value, w = pad + 2)?;
                }
            }
        }
        Ok(())
    }
}

impl<K: Debug + 'static, V: Debug + 'static> Display for TreeDump<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_inode(f, &self.0.read_root(false), 0)
    }
}

impl<K: Debug + 'static, V: Debug + 'static> RawTrie<K, V> {
    pub(crate) fn dump(&self) -> String {
        TreeDump(self).to_string()
    }
}

impl<K, V, S> TrieMap<K, V, S>
where
    K: Hash + Eq + Clone + Debug + 'static,
    V: Clone + Debug + 'static,
    S: BuildHasher,
{
    /// Renders the internal node structure, one node per line.
    pub fn debug_tree(&self) -> String {
        let _guard = kovan::pin();
        self.raw().dump()
    }
}

impl<K, V, S> ReadOnlyTrieMap<K, V, S>
where
    K: Hash + Eq + Clone + Debug + 'static,
    V: Clone + Debug + 'static,
    S: BuildHasher,
{
    /// Renders the internal node structure, one node per line.
    pub fn debug_tree(&self) -> String {
        let _guard = kovan::pin();
        self.raw().dump()
    }
}

#[cfg(test)]
mod tests {
    use crate::TrieMap;
    use alloc::vec::Vec;

    #[test]
    fn test_dump_lists_every_entry() {
        let map = TrieMap::new();
        for i in 0..40u32 {
            map.insert(i, i);
        }
        let dump = map.debug_tree();
        assert!(dump.starts_with("INode"));
        assert_eq!(dump.matches("SNode").count(), 40);
    }

    #[test]
    fn test_dump_of_empty_map() {
        let map: TrieMap<u32, u32> = TrieMap::new();
        let dump = map.debug_tree();
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.lines().nth(1).is_some_and(|l| l.trim_start().starts_with("CNode")));
    }

    #[test]
    fn test_dump_indents_nested_levels() {
        // 40 keys over 32 root slots: at least one slot holds a subtree
        let map = TrieMap::new();
        for i in 0..40u32 {
            map.insert(i, i);
        }
        let dump = map.debug_tree();
        let depth = |line: &str| line.len() - line.trim_start().len();
        let lines: Vec<&str> = dump.lines().collect();

        assert_eq!(depth(lines[0]), 0);
        let nested = lines
            .iter()
            .position(|l| l.contains("INode") && depth(l) > 0)
            .expect("a nested indirection");
        assert_eq!(depth(lines[nested]), 4, "{dump}");
        assert!(lines[nested + 1].trim_start().starts_with("CNode"));
        assert_eq!(depth(lines[nested + 1]), 6);
    }
}
