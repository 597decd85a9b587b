//! Phylogenetic tree: Newick parsing, leaf order and rectangular layout.

use crate::engine::LeafOrder;
use crate::error::{BubbleError, Result};
use log::{debug, info};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// A node of a parsed tree.
///
/// Children always have a larger index than their parent.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub name: String,
    /// Branch length to the parent, if given.
    pub length: Option<f64>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl TreeNode {
    fn new(parent: Option<usize>) -> Self {
        Self {
            name: String::new(),
            length: None,
            parent,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A rooted tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Phylogeny {
    nodes: Vec<TreeNode>,
}

impl Phylogeny {
    /// Read a Newick formatted tree.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BubbleError::MissingInputFile(path.to_path_buf()));
        }
        info!("Reading {} as newick formatted tree file...", path.display());
        let tree: Phylogeny = fs::read_to_string(path)?.parse()?;
        info!(
            "Found {} nodes, {} leaves",
            tree.len(),
            tree.leaves().len()
        );
        Ok(tree)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: usize) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Leaf node ids, left to right.
    pub fn leaves(&self) -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut stack = vec![0usize];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.is_leaf() {
                leaves.push(id);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        leaves
    }

    /// Names of the terminal nodes, left to right.
    ///
    /// Fails if a leaf is unnamed or two leaves share a name.
    pub fn leaf_order(&self) -> Result<LeafOrder> {
        let mut names = Vec::new();
        for id in self.leaves() {
            let name = &self.nodes[id].name;
            if name.is_empty() {
                return Err(BubbleError::InvalidInput(
                    "tree has an unnamed leaf".to_string(),
                ));
            }
            names.push(name.clone());
        }
        LeafOrder::new(names)
    }

    /// Rectangular (cladogram) layout.
    ///
    /// Leaf `i` sits at `y = i`; an internal node sits midway between its
    /// first and last child. `x` is the distance from the root, counting
    /// each branch as 1 when the tree carries no branch lengths.
    pub fn layout(&self) -> TreeLayout {
        let n = self.nodes.len();
        let has_lengths = self.nodes.iter().skip(1).any(|node| node.length.is_some());

        let mut x = vec![0.0f64; n];
        for id in 1..n {
            let node = &self.nodes[id];
            let parent = node.parent.unwrap_or(0);
            let step = if has_lengths {
                node.length.unwrap_or(0.0)
            } else {
                1.0
            };
            x[id] = x[parent] + step;
        }

        let mut y = vec![0.0f64; n];
        let leaves = self.leaves();
        for (i, &id) in leaves.iter().enumerate() {
            y[id] = i as f64;
        }
        for id in (0..n).rev() {
            let children = &self.nodes[id].children;
            if let (Some(&first), Some(&last)) = (children.first(), children.last()) {
                y[id] = (y[first] + y[last]) / 2.0;
            }
        }

        let mut branches = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                branches.push(Branch {
                    x1: x[parent],
                    y1: y[id],
                    x2: x[id],
                    y2: y[id],
                });
            }
            if let (Some(&first), Some(&last)) = (node.children.first(), node.children.last()) {
                if first != last {
                    branches.push(Branch {
                        x1: x[id],
                        y1: y[first],
                        x2: x[id],
                        y2: y[last],
                    });
                }
            }
        }

        let min_x = x.iter().copied().fold(0.0f64, f64::min);
        let max_x = x.iter().copied().fold(0.0f64, f64::max);
        let tips = leaves.iter().map(|&id| x[id]).collect();
        debug!(
            "Tree layout: {} leaves, depth range [{:.4}, {:.4}], {} branch segments",
            leaves.len(),
            min_x,
            max_x,
            branches.len()
        );

        TreeLayout {
            min_x,
            max_x,
            tips,
            branches,
        }
    }
}

/// An axis-aligned line of the tree drawing, in tree units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Branch {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Geometry of a tree drawing, independent of the output device.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeLayout {
    pub min_x: f64,
    pub max_x: f64,
    /// Depth of each leaf, in leaf order.
    pub tips: Vec<f64>,
    pub branches: Vec<Branch>,
}

impl TreeLayout {
    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.tips.len()
    }
}

impl FromStr for Phylogeny {
    type Err = BubbleError;

    fn from_str(s: &str) -> Result<Self> {
        NewickParser::new(s).parse()
    }
}

struct NewickParser<'a> {
    src: &'a str,
    pos: usize,
    nodes: Vec<TreeNode>,
}

impl<'a> NewickParser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            nodes: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> BubbleError {
        BubbleError::TreeParse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn add_node(&mut self, parent: Option<usize>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TreeNode::new(parent));
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    fn parse(mut self) -> Result<Phylogeny> {
        let mut current = self.add_node(None);
        // Set once a node's label or length has been read; a '(' may not follow.
        let mut closed = false;

        loop {
            let c = self.peek().ok_or_else(|| self.error("missing ';' at end of tree"))?;
            match c {
                c if c.is_whitespace() => self.pos += c.len_utf8(),
                '[' => self.skip_comment()?,
                '(' => {
                    if closed || !self.nodes[current].children.is_empty() {
                        return Err(self.error("unexpected '('"));
                    }
                    self.pos += 1;
                    current = self.add_node(Some(current));
                }
                ',' => {
                    let parent = self.nodes[current]
                        .parent
                        .ok_or_else(|| self.error("',' outside of parentheses"))?;
                    self.pos += 1;
                    current = self.add_node(Some(parent));
                    closed = false;
                }
                ')' => {
                    current = self.nodes[current]
                        .parent
                        .ok_or_else(|| self.error("unbalanced ')'"))?;
                    self.pos += 1;
                    closed = false;
                }
                ':' => {
                    if self.nodes[current].length.is_some() {
                        return Err(self.error("branch length given twice"));
                    }
                    self.pos += 1;
                    let length = self.read_length()?;
                    self.nodes[current].length = Some(length);
                    closed = true;
                }
                ';' => {
                    if self.nodes[current].parent.is_some() {
                        return Err(self.error("unbalanced '(' before ';'"));
                    }
                    self.pos += 1;
                    if !self.src[self.pos..].trim().is_empty() {
                        return Err(self.error("unexpected text after ';'"));
                    }
                    break;
                }
                _ => {
                    if !self.nodes[current].name.is_empty() || self.nodes[current].length.is_some() {
                        return Err(self.error("unexpected label"));
                    }
                    let name = if c == '\'' {
                        self.read_quoted()?
                    } else {
                        self.read_unquoted()
                    };
                    self.nodes[current].name = name;
                    closed = true;
                }
            }
        }

        Ok(Phylogeny { nodes: self.nodes })
    }

    fn skip_comment(&mut self) -> Result<()> {
        match self.src[self.pos..].find(']') {
            Some(end) => {
                self.pos += end + 1;
                Ok(())
            }
            None => Err(self.error("unterminated '[' comment")),
        }
    }

    fn token_end(&self) -> usize {
        self.src[self.pos..]
            .find(|c: char| "(),:;[".contains(c) || c.is_whitespace())
            .map(|i| self.pos + i)
            .unwrap_or(self.src.len())
    }

    fn read_unquoted(&mut self) -> String {
        let end = self.token_end();
        let name = self.src[self.pos..end].to_string();
        self.pos = end;
        name
    }

    fn read_quoted(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut name = String::new();
        loop {
            let c = self.peek().ok_or_else(|| BubbleError::TreeParse {
                position: start,
                message: "unterminated quoted label".to_string(),
            })?;
            self.pos += c.len_utf8();
            if c == '\'' {
                if self.peek() == Some('\'') {
                    self.pos += 1;
                    name.push('\'');
                } else {
                    return Ok(name);
                }
            } else {
                name.push(c);
            }
        }
    }

    fn read_length(&mut self) -> Result<f64> {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
        let end = self.token_end();
        let raw = &self.src[self.pos..end];
        let length: f64 = raw
            .parse()
            .map_err(|_| self.error(format!("invalid branch length '{}'", raw)))?;
        if !length.is_finite() {
            return Err(self.error(format!("invalid branch length '{}'", raw)));
        }
        self.pos = end;
        Ok(length)
    }
}
