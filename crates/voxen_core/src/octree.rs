//! Sparse voxel octree.
//!
//! A cube of side `2^depth` voxels. Uniform regions collapse into a single
//! leaf, so a mostly empty world costs a handful of nodes. Coordinates are
//! octree-local and non-negative; anything outside reads as air.

use std::io::{self, Read, Write};

use crate::binary::{invalid_data, read_i32, write_i32};
use crate::voxel::AIR;

/// Deepest octree we will build or load.
pub const MAX_DEPTH: u32 = 16;

/// Marker for an internal node in the serialized stream.
const BRANCH: i32 = -1;

/// One octree node: either uniform or split into eight octants.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(u32),
    Branch(Box<[Node; 8]>),
}

/// Result of descending to the leaf containing a voxel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LeafRef {
    /// Packed voxel value shared by the whole leaf.
    pub value: u32,
    /// Leaf size is `1 << level` voxels per side.
    pub level: u32,
}

/// Sparse voxel index.
#[derive(Debug, Clone, PartialEq)]
pub struct Octree {
    depth: u32,
    root: Node,
}

/// Octant of (x, y, z) at a given level.
#[inline]
fn child_index(x: i32, y: i32, z: i32, level: u32) -> usize {
    ((((x >> level) & 1) << 2) | (((y >> level) & 1) << 1) | ((z >> level) & 1)) as usize
}

impl Octree {
    /// An all-air octree of side `2^depth`.
    pub fn new(depth: u32) -> Self {
        Self {
            depth: depth.min(MAX_DEPTH),
            root: Node::Leaf(AIR),
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Side length in voxels.
    pub fn size(&self) -> i32 {
        1 << self.depth
    }

    /// True if the voxel lies inside the cube.
    #[inline]
    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        let size = self.size();
        (0..size).contains(&x) && (0..size).contains(&y) && (0..size).contains(&z)
    }

    /// Value of the voxel at (x, y, z); air outside the cube.
    pub fn get(&self, x: i32, y: i32, z: i32) -> u32 {
        self.locate(x, y, z).map(|leaf| leaf.value).unwrap_or(AIR)
    }

    /// Descend to the leaf containing (x, y, z).
    pub fn locate(&self, x: i32, y: i32, z: i32) -> Option<LeafRef> {
        if !self.contains(x, y, z) {
            return None;
        }
        let mut node = &self.root;
        let mut level = self.depth;
        loop {
            match node {
                Node::Leaf(value) => {
                    return Some(LeafRef {
                        value: *value,
                        level,
                    })
                }
                Node::Branch(children) => {
                    level -= 1;
                    node = &children[child_index(x, y, z, level)];
                }
            }
        }
    }

    /// Store `value` at (x, y, z), splitting and merging nodes as needed.
    ///
    /// Writes outside the cube are ignored.
    pub fn set(&mut self, x: i32, y: i32, z: i32, value: u32) {
        if !self.contains(x, y, z) {
            log::trace!("Octree write outside bounds at ({}, {}, {})", x, y, z);
            return;
        }
        insert(&mut self.root, self.depth, x, y, z, value);
    }

    /// Total number of nodes, leaves included.
    pub fn node_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 1,
                Node::Branch(children) => 1 + children.iter().map(count).sum::<usize>(),
            }
        }
        count(&self.root)
    }

    /// Serialize as depth followed by nodes in pre-order.
    pub fn store<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        fn store_node<W: Write + ?Sized>(out: &mut W, node: &Node) -> io::Result<()> {
            match node {
                Node::Leaf(value) => write_i32(out, *value as i32),
                Node::Branch(children) => {
                    write_i32(out, BRANCH)?;
                    children.iter().try_for_each(|child| store_node(out, child))
                }
            }
        }
        write_i32(out, self.depth as i32)?;
        store_node(out, &self.root)
    }

    /// Inverse of [`Octree::store`].
    pub fn load<R: Read + ?Sized>(input: &mut R) -> io::Result<Octree> {
        fn load_node<R: Read + ?Sized>(input: &mut R, level: u32) -> io::Result<Node> {
            let tag = read_i32(input)?;
            if tag == BRANCH {
                if level == 0 {
                    return Err(invalid_data("octree branch below voxel level"));
                }
                let mut children: [Node; 8] = std::array::from_fn(|_| Node::Leaf(AIR));
                for child in children.iter_mut() {
                    *child = load_node(input, level - 1)?;
                }
                Ok(Node::Branch(Box::new(children)))
            } else if tag < 0 {
                Err(invalid_data(format!("invalid octree node tag {}", tag)))
            } else {
                Ok(Node::Leaf(tag as u32))
            }
        }

        let depth = read_i32(input)?;
        if depth < 0 || depth as u32 > MAX_DEPTH {
            return Err(invalid_data(format!("invalid octree depth {}", depth)));
        }
        let depth = depth as u32;
        let root = load_node(input, depth)?;
        Ok(Octree { depth, root })
    }
}

fn insert(node: &mut Node, level: u32, x: i32, y: i32, z: i32, value: u32) {
    if let Node::Leaf(current) = *node {
        if current == value {
            return;
        }
        if level == 0 {
            *node = Node::Leaf(value);
            return;
        }
        *node = Node::Branch(Box::new(std::array::from_fn(|_| Node::Leaf(current))));
    }
    if let Node::Branch(children) = node {
        let child = &mut children[child_index(x, y, z, level - 1)];
        insert(child, level - 1, x, y, z, value);
        if let Some(merged) = uniform_leaf(children) {
            *node = Node::Leaf(merged);
        }
    }
}

/// The shared value if all eight children are identical leaves.
fn uniform_leaf(children: &[Node; 8]) -> Option<u32> {
    let first = match children[0] {
        Node::Leaf(value) => value,
        Node::Branch(_) => return None,
    };
    children[1..]
        .iter()
        .all(|child| matches!(child, Node::Leaf(v) if *v == first))
        .then_some(first)
}
