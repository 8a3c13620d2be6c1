//! Block container
//!
//! Scripts are stored as a flat map of blocks keyed by id. Sequences are
//! linked through `next`; C-shaped blocks reference their branches through
//! `SUBSTACK`, `SUBSTACK2`, ... inputs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::errors::BundleError;
use super::value::Value;

pub type BlockId = String;

/// Hat that starts a procedure's body
pub const PROCEDURE_DEFINITION: &str = "procedures_definition";
/// Block that runs a procedure
pub const PROCEDURE_CALL: &str = "procedures_call";
/// Field naming the procedure on definitions and calls
pub const PROCCODE_FIELD: &str = "PROCCODE";
/// Definition field that runs the procedure in warp mode
pub const WARP_FIELD: &str = "WARP";

/// Input slot of a block: either a literal or a child block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Input {
    Value(Value),
    Block(BlockId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub opcode: String,
    #[serde(default)]
    pub next: Option<BlockId>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Input>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, rename = "topLevel")]
    pub top_level: bool,
}

impl Block {
    pub fn new(id: impl Into<BlockId>, opcode: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            opcode: opcode.into(),
            next: None,
            inputs: BTreeMap::new(),
            fields: BTreeMap::new(),
            top_level: false,
        }
    }

    /// Inputs evaluated as values, i.e. everything except branches
    pub fn value_inputs(&self) -> impl Iterator<Item = (&String, &Input)> {
        self.inputs.iter().filter(|(name, _)| !is_branch_input(name))
    }
}

fn is_branch_input(name: &str) -> bool {
    name.starts_with("SUBSTACK")
}

fn branch_input_name(branch: usize) -> String {
    if branch <= 1 {
        "SUBSTACK".to_string()
    } else {
        format!("SUBSTACK{}", branch)
    }
}

/* ===================== Container ===================== */

/// JSON shape of a script bundle
#[derive(Debug, Serialize, Deserialize)]
struct Bundle {
    blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default)]
pub struct BlockContainer {
    blocks: HashMap<BlockId, Block>,
    scripts: Vec<BlockId>,
}

impl BlockContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a `{"blocks": [...]}` bundle
    pub fn from_json(source: &str) -> Result<Self, BundleError> {
        let bundle: Bundle = serde_json::from_str(source)?;
        let mut container = BlockContainer::new();
        for block in bundle.blocks {
            if container.blocks.contains_key(&block.id) {
                return Err(BundleError::DuplicateBlock(block.id));
            }
            container.create_block(block);
        }
        container.validate()?;
        Ok(container)
    }

    /// Every reference inside the container must resolve
    pub fn validate(&self) -> Result<(), BundleError> {
        for block in self.blocks.values() {
            let next = block.next.iter();
            let children = block.inputs.values().filter_map(|input| match input {
                Input::Block(id) => Some(id),
                Input::Value(_) => None,
            });
            for target in next.chain(children) {
                if !self.blocks.contains_key(target) {
                    return Err(BundleError::UnknownReference {
                        block: block.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Add a block; top-level blocks also start a script
    pub fn create_block(&mut self, block: Block) {
        if block.top_level && !self.scripts.contains(&block.id) {
            self.scripts.push(block.id.clone());
        }
        self.blocks.insert(block.id.clone(), block);
    }

    /// Remove a script and every block reachable from its top block
    pub fn delete_script(&mut self, top_block: &str) -> bool {
        if !self.scripts.iter().any(|id| id == top_block) {
            return false;
        }
        self.scripts.retain(|id| id != top_block);

        let mut pending = vec![top_block.to_string()];
        let mut seen = HashSet::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(block) = self.blocks.remove(&id) {
                pending.extend(block.next);
                pending.extend(block.inputs.into_values().filter_map(|input| match input {
                    Input::Block(child) => Some(child),
                    Input::Value(_) => None,
                }));
            }
        }
        true
    }

    pub fn get(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn opcode(&self, id: &str) -> Option<&str> {
        self.blocks.get(id).map(|b| b.opcode.as_str())
    }

    pub fn next_block(&self, id: &str) -> Option<&BlockId> {
        self.blocks.get(id).and_then(|b| b.next.as_ref())
    }

    /// First block of a C-block's branch (1-based)
    pub fn branch(&self, id: &str, branch: usize) -> Option<&BlockId> {
        let block = self.blocks.get(id)?;
        match block.inputs.get(&branch_input_name(branch))? {
            Input::Block(child) => Some(child),
            Input::Value(_) => None,
        }
    }

    /// Definition hat of the procedure named `proccode`
    pub fn procedure_definition(&self, proccode: &str) -> Option<&Block> {
        self.scripts
            .iter()
            .filter_map(|id| self.blocks.get(id))
            .find(|block| {
                block.opcode == PROCEDURE_DEFINITION
                    && block
                        .fields
                        .get(PROCCODE_FIELD)
                        .is_some_and(|code| code.to_string() == proccode)
            })
    }

    /// Top-level block ids in creation order
    pub fn scripts(&self) -> &[BlockId] {
        &self.scripts
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }
}
