// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The recursive ByteTree wire format (§4.3): a tagged leaf/node structure
//! used for every serialized value in the library. Leaves carry a big-endian
//! length prefix; nodes carry a big-endian child count. Also provides a
//! streaming reader for bounded-memory traversal and `zip_sort_project`, the
//! external-sort primitive file-backed permutations are built on.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::io::{self, Read, Write};
use std::rc::Rc;

use crate::errors::{FatalError, FormatError};

const LEAF_TAG: u8 = 0x01;
const NODE_TAG: u8 = 0x00;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteTree {
    Leaf(Vec<u8>),
    Node(Vec<ByteTree>),
}

impl ByteTree {
    pub fn leaf(bytes: impl Into<Vec<u8>>) -> Self {
        ByteTree::Leaf(bytes.into())
    }

    pub fn node(children: Vec<ByteTree>) -> Self {
        ByteTree::Node(children)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ByteTree::Leaf(_))
    }

    pub fn as_leaf(&self) -> Result<&[u8], FormatError> {
        match self {
            ByteTree::Leaf(bytes) => Ok(bytes),
            ByteTree::Node(_) => Err(FormatError::ExpectedLeaf),
        }
    }

    pub fn as_children(&self) -> Result<&[ByteTree], FormatError> {
        match self {
            ByteTree::Node(children) => Ok(children),
            ByteTree::Leaf(_) => Err(FormatError::ExpectedNode { expected: 0 }),
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            ByteTree::Leaf(bytes) => {
                w.write_all(&[LEAF_TAG])?;
                w.write_all(&(bytes.len() as u32).to_be_bytes())?;
                w.write_all(bytes)?;
            }
            ByteTree::Node(children) => {
                w.write_all(&[NODE_TAG])?;
                w.write_all(&(children.len() as u32).to_be_bytes())?;
                for child in children {
                    child.write_to(w)?;
                }
            }
        }
        Ok(())
    }

    /// Encodes this tree to an in-memory buffer. Infallible: writing to a
    /// `Vec<u8>` never fails.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let _ = self.write_to(&mut buf);
        buf
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<ByteTree, FormatError> {
        match read_tag(r)? {
            Tag::Leaf(len) => {
                let mut bytes = vec![0u8; len];
                read_exact(r, &mut bytes)?;
                Ok(ByteTree::Leaf(bytes))
            }
            Tag::Node(count) => {
                let mut children = Vec::with_capacity(count);
                for _ in 0..count {
                    children.push(ByteTree::read_from(r)?);
                }
                Ok(ByteTree::Node(children))
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ByteTree, FormatError> {
        let mut cursor = io::Cursor::new(bytes);
        ByteTree::read_from(&mut cursor)
    }
}

enum Tag {
    Leaf(usize),
    Node(usize),
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), FormatError> {
    r.read_exact(buf).map_err(|_| FormatError::TruncatedStream)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, FormatError> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_tag<R: Read>(r: &mut R) -> Result<Tag, FormatError> {
    let mut tag = [0u8; 1];
    read_exact(r, &mut tag)?;
    match tag[0] {
        LEAF_TAG => Ok(Tag::Leaf(read_u32(r)? as usize)),
        NODE_TAG => Ok(Tag::Node(read_u32(r)? as usize)),
        other => Err(FormatError::InvalidTag(other)),
    }
}

/// A streaming reader positioned at one node (or leaf) of a ByteTree,
/// sharing the underlying byte source with any readers obtained via
/// `get_next_child`, so descending into a child never buffers siblings it
/// hasn't visited yet.
pub struct ByteTreeReader<R: Read> {
    stream: Rc<RefCell<R>>,
    remaining: usize,
    is_leaf: bool,
    leaf_len: usize,
}

impl<R: Read> ByteTreeReader<R> {
    pub fn new(source: R) -> Result<Self, FormatError> {
        Self::from_shared(Rc::new(RefCell::new(source)))
    }

    fn from_shared(stream: Rc<RefCell<R>>) -> Result<Self, FormatError> {
        let tag = {
            let mut s = stream.borrow_mut();
            read_tag(&mut *s)?
        };
        let (is_leaf, remaining, leaf_len) = match tag {
            Tag::Leaf(len) => (true, 0, len),
            Tag::Node(count) => (false, count, 0),
        };
        Ok(ByteTreeReader {
            stream,
            remaining,
            is_leaf,
            leaf_len,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// Siblings at this node not yet visited via `get_next_child`.
    pub fn get_remaining(&self) -> usize {
        self.remaining
    }

    /// Reads the bytes of the current leaf. Errors if this reader is
    /// positioned at a node.
    pub fn read(&mut self) -> Result<Vec<u8>, FormatError> {
        if !self.is_leaf {
            return Err(FormatError::ExpectedLeaf);
        }
        let mut buf = vec![0u8; self.leaf_len];
        read_exact(&mut *self.stream.borrow_mut(), &mut buf)?;
        self.leaf_len = 0;
        Ok(buf)
    }

    /// Descends into the next not-yet-visited child of this node.
    pub fn get_next_child(&mut self) -> Result<ByteTreeReader<R>, FormatError> {
        if self.is_leaf {
            return Err(FormatError::ExpectedNode { expected: 0 });
        }
        if self.remaining == 0 {
            return Err(FormatError::DeclaredCountExceeded { declared: 0 });
        }
        self.remaining -= 1;
        ByteTreeReader::from_shared(self.stream.clone())
    }

    /// Advances past the next `n` children without materializing them.
    pub fn unsafe_skip_children(&mut self, n: usize) -> Result<(), FormatError> {
        for _ in 0..n {
            let mut child = self.get_next_child()?;
            child.skip_subtree()?;
        }
        Ok(())
    }

    fn skip_subtree(&mut self) -> Result<(), FormatError> {
        if self.is_leaf {
            self.read()?;
        } else {
            let remaining = self.remaining;
            self.unsafe_skip_children(remaining)?;
        }
        Ok(())
    }
}

/// Incremental node writer: emits the node header up front, then accepts
/// leaves one at a time, so a caller streaming a large array never holds the
/// whole encoded tree in memory.
pub struct ByteTreeNodeWriter<'w, W: Write> {
    sink: &'w mut W,
}

impl<'w, W: Write> ByteTreeNodeWriter<'w, W> {
    pub fn begin(sink: &'w mut W, child_count: usize) -> io::Result<Self> {
        sink.write_all(&[NODE_TAG])?;
        sink.write_all(&(child_count as u32).to_be_bytes())?;
        Ok(ByteTreeNodeWriter { sink })
    }

    pub fn write_leaf(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sink.write_all(&[LEAF_TAG])?;
        self.sink.write_all(&(bytes.len() as u32).to_be_bytes())?;
        self.sink.write_all(bytes)
    }
}

fn leaf_bytes(tree: &ByteTree) -> &[u8] {
    match tree {
        ByteTree::Leaf(bytes) => bytes,
        ByteTree::Node(_) => &[],
    }
}

/// Unsigned big-endian comparison: shorter arrays are smaller, equal-length
/// arrays compare lexicographically.
pub fn compare_unsigned_bigendian(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// The permutation comparator of §4.3: compares two leaves as unsigned
/// big-endian integers.
pub fn permutation_leaf_cmp(a: &ByteTree, b: &ByteTree) -> Ordering {
    compare_unsigned_bigendian(leaf_bytes(a), leaf_bytes(b))
}

/// `zipSortProject(keyBT, valueBT, cmp)` of §4.3: zips two same-arity node
/// trees into `(key, value)` pairs, sorts stably by `cmp` applied to the
/// keys, and returns a node of the values in that order. The backbone of
/// every file-backed `Permutation` operation (§4.8).
pub fn zip_sort_project<F>(key: &ByteTree, value: &ByteTree, mut cmp: F) -> Result<ByteTree, FatalError>
where
    F: FnMut(&ByteTree, &ByteTree) -> Ordering,
{
    let key_children = key.as_children().map_err(FormatError::into_fatal)?;
    let value_children = value.as_children().map_err(FormatError::into_fatal)?;
    if key_children.len() != value_children.len() {
        return Err(FatalError::UnreachableBranch(
            "zip_sort_project: mismatched child counts",
        ));
    }

    let mut pairs: Vec<(&ByteTree, &ByteTree)> =
        key_children.iter().zip(value_children.iter()).collect();
    pairs.sort_by(|a, b| cmp(a.0, b.0));

    Ok(ByteTree::Node(
        pairs.into_iter().map(|(_, v)| v.clone()).collect(),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn leaf_round_trips() {
        let tree = ByteTree::leaf(vec![1, 2, 3]);
        let bytes = tree.to_bytes();
        assert_eq!(bytes, vec![0x01, 0, 0, 0, 3, 1, 2, 3]);
        assert_eq!(ByteTree::from_bytes(&bytes), Ok(tree));
    }

    #[test]
    fn node_round_trips() {
        let tree = ByteTree::node(vec![ByteTree::leaf(vec![9]), ByteTree::leaf(vec![8, 7])]);
        let bytes = tree.to_bytes();
        assert_eq!(ByteTree::from_bytes(&bytes), Ok(tree));
    }

    #[test]
    fn invalid_tag_is_rejected() {
        assert_eq!(
            ByteTree::from_bytes(&[0x7f, 0, 0, 0, 0]),
            Err(FormatError::InvalidTag(0x7f))
        );
    }

    #[test]
    fn truncated_stream_is_rejected() {
        assert_eq!(
            ByteTree::from_bytes(&[0x01, 0, 0, 0, 5, 1, 2]),
            Err(FormatError::TruncatedStream)
        );
    }

    #[test]
    fn streaming_reader_descends_and_tracks_remaining() {
        let tree = ByteTree::node(vec![
            ByteTree::leaf(vec![1]),
            ByteTree::leaf(vec![2, 2]),
            ByteTree::node(vec![ByteTree::leaf(vec![3])]),
        ]);
        let bytes = tree.to_bytes();
        let mut reader = ByteTreeReader::new(io::Cursor::new(bytes)).unwrap();
        assert!(!reader.is_leaf());
        assert_eq!(reader.get_remaining(), 3);

        let mut first = reader.get_next_child().unwrap();
        assert_eq!(reader.get_remaining(), 2);
        assert!(first.is_leaf());
        assert_eq!(first.read().unwrap(), vec![1]);

        let mut second = reader.get_next_child().unwrap();
        assert_eq!(second.read().unwrap(), vec![2, 2]);

        let mut third = reader.get_next_child().unwrap();
        assert_eq!(reader.get_remaining(), 0);
        assert!(!third.is_leaf());
        assert_eq!(third.get_remaining(), 1);
        let mut grandchild = third.get_next_child().unwrap();
        assert_eq!(grandchild.read().unwrap(), vec![3]);
    }

    #[test]
    fn unsafe_skip_children_advances_without_reading() {
        let tree = ByteTree::node(vec![
            ByteTree::leaf(vec![1, 1, 1]),
            ByteTree::node(vec![ByteTree::leaf(vec![2]), ByteTree::leaf(vec![3])]),
            ByteTree::leaf(vec![4]),
        ]);
        let bytes = tree.to_bytes();
        let mut reader = ByteTreeReader::new(io::Cursor::new(bytes)).unwrap();
        reader.unsafe_skip_children(2).unwrap();
        assert_eq!(reader.get_remaining(), 1);
        let mut last = reader.get_next_child().unwrap();
        assert_eq!(last.read().unwrap(), vec![4]);
    }

    #[test]
    fn permutation_cmp_orders_by_length_then_lex() {
        let short = ByteTree::leaf(vec![0xff]);
        let long = ByteTree::leaf(vec![0x00, 0x01]);
        assert_eq!(permutation_leaf_cmp(&short, &long), Ordering::Less);

        let a = ByteTree::leaf(vec![0x01, 0x00]);
        let b = ByteTree::leaf(vec![0x01, 0x01]);
        assert_eq!(permutation_leaf_cmp(&a, &b), Ordering::Less);
    }

    #[test]
    fn zip_sort_project_inverts_a_permutation() {
        // table = [2, 0, 1]: apply(src)[table[i]] = src[i].
        let table = ByteTree::node(vec![
            ByteTree::leaf(vec![2]),
            ByteTree::leaf(vec![0]),
            ByteTree::leaf(vec![1]),
        ]);
        let indices = ByteTree::node(vec![
            ByteTree::leaf(vec![0]),
            ByteTree::leaf(vec![1]),
            ByteTree::leaf(vec![2]),
        ]);
        let inverse = zip_sort_project(&table, &indices, permutation_leaf_cmp).unwrap();
        let children = inverse.as_children().unwrap();
        let values: Vec<u8> = children
            .iter()
            .map(|c| c.as_leaf().unwrap()[0])
            .collect();
        // table sorted by key gives keys [0,1,2] -> projected values [1,2,0],
        // which is indeed the inverse of [2,0,1].
        assert_eq!(values, vec![1, 2, 0]);
    }
}
