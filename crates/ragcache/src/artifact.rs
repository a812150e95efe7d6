//! Tree artifact format.
//!
//! Retrieval trees ship as `.tree` files: a small length-prefixed
//! record container produced by the offline migration from the legacy
//! artifact format. Layout:
//!
//! ```text
//! "IFTR"  magic (4 bytes)
//! u8      format version (currently 1)
//! u32 LE  record count
//! then per node: u32 LE json_len, json document
//! ```
//!
//! Each record is `{id, layer, text, source?, children}`. Layer 0 holds
//! original content; higher layers are summaries over their children.

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use ifox_domain::{Error, Result};

const MAGIC: &[u8; 4] = b"IFTR";
const VERSION: u8 = 1;
/// Fallback per-node size estimate when the on-disk size is unknown.
const NODE_SIZE_ESTIMATE: u64 = 10 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: u32,
    pub layer: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub children: Vec<u32>,
}

/// A loaded retrieval tree. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Tree {
    pub name: String,
    pub nodes: Vec<TreeNode>,
    /// Resident-size estimate used for cache accounting.
    pub bytes: u64,
}

impl Tree {
    pub fn node(&self, id: u32) -> Option<&TreeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Read a tree artifact from disk.
pub fn read_tree(name: &str, path: &Path) -> Result<Tree> {
    let mut file = std::fs::File::open(path)?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::Config(format!(
            "{}: not a tree artifact",
            path.display()
        )));
    }
    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    if version[0] != VERSION {
        return Err(Error::Config(format!(
            "{}: unsupported artifact version {}",
            path.display(),
            version[0]
        )));
    }

    let mut count_buf = [0u8; 4];
    file.read_exact(&mut count_buf)?;
    let count = u32::from_le_bytes(count_buf) as usize;

    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut record = vec![0u8; len];
        file.read_exact(&mut record)?;
        nodes.push(serde_json::from_slice::<TreeNode>(&record)?);
    }

    let bytes = match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => meta.len(),
        _ => nodes.len() as u64 * NODE_SIZE_ESTIMATE,
    };

    Ok(Tree {
        name: name.to_string(),
        nodes,
        bytes,
    })
}

/// Write a tree artifact (used by migrations, tree creation, and tests).
pub fn write_tree(path: &Path, nodes: &[TreeNode]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(MAGIC)?;
    file.write_all(&[VERSION])?;
    file.write_all(&(nodes.len() as u32).to_le_bytes())?;
    for node in nodes {
        let record = serde_json::to_vec(node)?;
        file.write_all(&(record.len() as u32).to_le_bytes())?;
        file.write_all(&record)?;
    }
    Ok(())
}

/// Build a two-layer tree from raw documents: one leaf per document
/// plus a single summary root over them.
pub fn tree_from_documents(documents: &[String]) -> Vec<TreeNode> {
    let mut nodes: Vec<TreeNode> = documents
        .iter()
        .enumerate()
        .map(|(i, text)| TreeNode {
            id: i as u32,
            layer: 0,
            text: text.clone(),
            source: None,
            children: Vec::new(),
        })
        .collect();
    let summary = documents
        .iter()
        .filter_map(|d| d.lines().next())
        .collect::<Vec<_>>()
        .join(" / ");
    nodes.push(TreeNode {
        id: documents.len() as u32,
        layer: 1,
        text: summary,
        source: None,
        children: (0..documents.len() as u32).collect(),
    });
    nodes
}
